use std::process::ExitCode;

fn main() -> anyhow::Result<ExitCode> {
    download_master_lib::run()
}
