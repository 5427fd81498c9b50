const USAGE: &str = "Usage: karavox <cdg_path> <out_rgb24_path> [at_ms]";

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let cdg_path = args.next().unwrap_or_else(|| {
        eprintln!("{USAGE}");
        std::process::exit(2);
    });
    let out_path = args.next().unwrap_or_else(|| {
        eprintln!("{USAGE}");
        std::process::exit(2);
    });
    let at_ms: Option<u32> = args.next().map(|raw| {
        raw.parse().unwrap_or_else(|_| {
            eprintln!("Invalid at_ms; expected milliseconds as an integer.");
            std::process::exit(2);
        })
    });

    if let Err(err) = karavox::run(&cdg_path, &out_path, at_ms) {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}
