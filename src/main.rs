// Entrypoint for the CLI application.
// - Keeps `main` small: build settings and logging, connect, dispatch.
// - Returns `anyhow::Result` so any failure ends with a non-zero exit code.

use anyhow::Context;
use gdrive_tools::cli::{self, Cli, Commands};
use gdrive_tools::settings::{Overrides, Settings};
use gdrive_tools::tools::DriveTools;
use gdrive_tools::{logger, progress, scan};
use log::info;
use serde::Serialize;
use std::io::IsTerminal;
use std::path::Path;

fn main() -> anyhow::Result<()> {
    let cli = cli::parse();
    let settings = load_settings(&cli)?;
    logger::init_logger("gdrive", settings.log.as_deref()).context("Failed to open log file")?;
    describe(&cli, &settings);

    let max_depth = settings.max_depth;
    let interactive = settings.log.is_none() && std::io::stdout().is_terminal();
    // only commands that talk to Drive connect (and possibly authorize)
    let connect = move || {
        DriveTools::connect(settings, progress::for_terminal(interactive))
            .context("Failed to connect to Google Drive")
    };

    match cli.command {
        Commands::ScanLocal { paths } => print_json(&scan::scan_local(&paths, max_depth)?)?,
        Commands::ScanRemote { ids } => print_json(&connect()?.scan_remote(&ids)?)?,
        Commands::Upload(args) => {
            let tools = connect()?;
            let results = tools.upload(&args.files, &args.save_names, args.folder_id.as_deref())?;
            for (path, id) in results {
                println!("{}\t{}", path.display(), id);
            }
        }
        Commands::Download(args) => {
            let tools = connect()?;
            let results = tools.download(&args.ids, args.out_dir.as_deref())?;
            let ids = if args.ids.is_empty() {
                &tools.settings().download.file_id
            } else {
                &args.ids
            };
            for (id, path) in ids.iter().zip(results) {
                match path {
                    Some(p) => println!("{}\t{}", id, p.display()),
                    None => println!("{}\tFAILED", id),
                }
            }
        }
        Commands::MirrorUpload(args) => {
            let tools = connect()?;
            match tools.mirror_upload(&args.paths, args.folder_id.as_deref()) {
                Ok(tree) => print_json(&tree)?,
                Err(e) => {
                    if let Some(partial) = e.partial() {
                        print_json(partial)?;
                    }
                    return Err(e.into());
                }
            }
        }
        Commands::MirrorDownload(args) => {
            let tools = connect()?;
            print_json(&tools.mirror_download(&args.ids, args.out_dir.as_deref())?)?;
        }
        Commands::Login { reauth } => {
            let mut tools = connect()?;
            if reauth {
                tools.restart(true).context("Failed to re-authorize")?;
            }
            info!("Authorized for {}", tools.settings().google_drive.oauth_scope.join(" "));
        }
        Commands::Mkdir { name, parent } => {
            println!("{}", connect()?.create_folder(&name, parent.as_deref())?);
        }
    }
    Ok(())
}

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    // a missing settings file means built-in defaults
    let path = Path::new(&cli.settings);
    let path = (path.exists() || cli.settings.eq_ignore_ascii_case("off")).then_some(path);
    let overrides = Overrides {
        credentials_file: cli.cred.clone(),
        proxy: cli.proxy.clone(),
        log: cli.log.clone(),
        remote: cli.remote.then_some(true),
    };
    Ok(Settings::load(path, overrides)?)
}

fn describe(cli: &Cli, settings: &Settings) {
    info!("========== Google Drive Tools ==========");
    info!("settings: {}", cli.settings);
    if let Some(cred) = &settings.google_drive.credentials_file {
        info!("cred_file: {}", cred.display());
    }
    match &settings.proxy {
        Some(proxy) => info!("proxy: {}", proxy),
        None => info!("proxy: off (direct connection)"),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
