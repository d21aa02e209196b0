// env_logger setup. The sink is chosen explicitly: a log file when the
// settings name one, standard output otherwise.

use crate::error::DriveResult;
use env_logger::{Builder, Env, Target};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

pub fn init_logger(prefix: &'static str, log_file: Option<&Path>) -> DriveResult<()> {
    let target = match log_file {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Target::Pipe(Box::new(file))
        }
        None => Target::Stdout,
    };

    Builder::from_env(Env::default().default_filter_or("info"))
        .target(target)
        .format(move |buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                buf.timestamp(),
                record.level(),
                prefix,
                record.args()
            )
        })
        .init();
    Ok(())
}
