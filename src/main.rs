fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    if let Err(e) = simpledataset::run() {
        if let simpledataset::DatasetError::ValidationFailed { .. } = e {
            // The report has already been printed.
            eprintln!("{e}");
        } else {
            eprintln!("Error: {e}");
        }
        std::process::exit(1);
    }
}
