use clap::{Arg, Command};
use indicatif::{MultiProgress, ProgressBar};
use indicatif_log_bridge::LogWrapper;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use libsipm_framer::config::Config;
use libsipm_framer::frame_store::FrameStoreReader;
use libsipm_framer::process::process;
use libsipm_framer::spill_record::HitCategory;

fn make_template_config(path: &Path) {
    let config = Config::default();
    if let Err(e) = config.write_config_file(path) {
        log::error!("Could not create template config file: {e}");
    }
}

/// Log a per-spill summary of a frame store
fn inspect_store(path: &Path) {
    let mut reader = match FrameStoreReader::open(path) {
        Ok(r) => r,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!(
        "{} spills, frame size {}",
        reader.n_spills(),
        reader.frame_size()
    );
    loop {
        let spill = match reader.next_spill() {
            Ok(Some(s)) => s,
            Ok(None) => break,
            Err(e) => {
                log::error!("{e}");
                return;
            }
        };
        log::info!(
            "Spill {}: {} frames, trigger0 = {}, timing = {}, cherenkov = {}, tracking = {}",
            spill.id,
            spill.frame_n(),
            spill.trigger0_size(),
            spill.category(HitCategory::Timing).size(),
            spill.category(HitCategory::Cherenkov).size(),
            spill.category(HitCategory::Tracking).size()
        );
        for (device, mask) in spill.participation() {
            log::info!("  device {device}: participation {mask:#010x}");
        }
        for (device, mask) in spill.dead() {
            log::warn!("  device {device}: dead {mask:#010x}");
        }
    }
}

fn main() {
    // Create a cli
    let matches = Command::new("sipm_framer_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .subcommand(Command::new("inspect").about("Summarize the spills of a frame store"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .help("Path to the file"),
        )
        .get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    LogWrapper::new(pb_manager.clone(), logger)
        .try_init()
        .expect("Could not create logging/progress!");

    // Parse the cli
    let path = PathBuf::from(matches.get_one::<String>("path").expect("We require args"));

    match matches.subcommand() {
        Some(("new", _)) => {
            log::info!("Making a template config at {}...", path.to_string_lossy());
            make_template_config(&path);
            log::info!("Done.");
            return;
        }
        Some(("inspect", _)) => {
            log::info!("Inspecting frame store {}...", path.to_string_lossy());
            inspect_store(&path);
            log::info!("Done.");
            return;
        }
        _ => (),
    }

    // Load our config
    log::info!("Loading config from {}...", path.to_string_lossy());
    let config = match Config::read_config_file(&path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Config successfully loaded.");
    log::info!("Streams: {}", config.streams.len());
    log::info!("Output Path: {}", config.output_path.to_string_lossy());
    if let Some(fine_path) = config.fine_histogram_path.as_ref() {
        log::info!("Fine Histogram Path: {}", fine_path.to_string_lossy());
    }
    log::info!("Frame Size: {}", config.frame_size);

    // Setup the progress bar
    let pb = pb_manager.add(ProgressBar::new(100));
    let (tx, rx) = mpsc::channel();
    // Spawn the task!
    let handle = std::thread::spawn(|| process(config, tx));

    loop {
        // Since we don't have a UI here, sleep for ~ 1 sec before trying to update
        std::thread::sleep(std::time::Duration::from_secs(1));
        if let Some(status) = rx.try_iter().last() {
            pb.set_position((status.progress * 100.0) as u64);
            pb.set_message(format!("{} spills", status.n_spills));
        }

        if handle.is_finished() {
            match handle.join() {
                Ok(result) => match result {
                    Ok(_) => log::info!("Successfully framed data!"),
                    Err(e) => log::error!("Framing failed with error: {e}"),
                },
                Err(_) => log::error!("Failed to join framing task!"),
            }
            break;
        }
    }

    pb.finish();

    log::info!("Done.");
}
