use pg_rewrite_proxy::app;

fn main() {
    let args = app::parse();
    app::init_logging(&args);

    let config = match app::config::load(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(exitcode::CONFIG);
        }
    };

    let rewriter_factory = match app::config::build_rewriter_factory(&config) {
        Ok(factory) => factory,
        Err(err) => {
            eprintln!("failed to build rewriter: {err}");
            std::process::exit(exitcode::CONFIG);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("failed to start tokio runtime: {err}");
            std::process::exit(exitcode::OSERR);
        }
    };

    if let Err(err) = runtime.block_on(app::server::run(config, rewriter_factory)) {
        tracing::error!(error = %err, "server exited with an error");
        std::process::exit(exitcode::SOFTWARE);
    }
}
