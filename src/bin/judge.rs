use anyhow::Result;

fn main() -> Result<()> {
    perfbox::cli::run(perfbox::cli::CliMode::Judge)
}
