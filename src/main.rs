#[cfg(not(feature = "coverage"))]
fn app_main() {
    use clap::Parser;

    voice_rpc::init_logging();
    voice_rpc::run(voice_rpc::cli::Cli::parse());
}

#[cfg(feature = "coverage")]
fn app_main() {
    voice_rpc::init_logging();
}

fn main() {
    app_main();
}
