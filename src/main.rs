fn main() {
    if let Err(err) = repoflow::cli::run() {
        repoflow::ui::output::error(format!("{:#}", err));
        std::process::exit(1);
    }
}
