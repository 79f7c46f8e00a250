mod cli;
mod tone;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        // Scripted walkthrough of the transport API
        Some("--script") => cli::run_script(),
        // Render through a manual clock, no audio hardware needed
        Some("--offline") => cli::run_offline(),
        Some("--devices") => cli::list_devices(),
        _ => cli::run_interactive(),
    }
}
