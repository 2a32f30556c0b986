fn main() {
    if let Err(err) = sitestore::cli::run() {
        eprintln!("error: {:#}", err);
        std::process::exit(sitestore::cli::exit_code(&err));
    }
}
