use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    appstats::cli::run(std::env::args().skip(1))
}
