//! `mailtrack` (mt) - issues as maildir threads inside your repository.

use mailtrack::run;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
