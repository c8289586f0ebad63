use activity_attribution::apps::run_cli;

fn main() {
    let stdout = std::io::stdout();
    if let Err(err) = run_cli(std::env::args().skip(1), &mut stdout.lock()) {
        eprintln!("activity-attribution: {err}");
        std::process::exit(1);
    }
}
