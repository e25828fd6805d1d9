use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    pagewise::example_apps::run_aggregate_demo(std::env::args().skip(1))
}
