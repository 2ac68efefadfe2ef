use clap::Parser;
use snafu::ErrorCompat;

mod args;
mod dash;

fn main() {
    let args = args::Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match dash::run_pipeline(&args) {
        Ok(summary) => {
            println!(
                "Wrote {} chart artifacts to {}",
                summary.written.len(),
                args.out
            );
            if !summary.failures.is_empty() {
                println!("Charts skipped after a generation failure:");
                for (name, error) in &summary.failures {
                    println!("   - {}: {}", name, error);
                }
            }
        }
        Err(e) => {
            eprintln!("An error occured {}", e);
            if let Some(bt) = ErrorCompat::backtrace(&e) {
                eprintln!("trace: {}", bt);
            }
            std::process::exit(1);
        }
    }
}
