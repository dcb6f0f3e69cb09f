use auraflow::cli::{
    ACCESS_SECRET_ENV, Args, REFRESH_SECRET_ENV, build_config, init_logging, load_secret,
    open_database, validate_settings,
};
use auraflow::{init_cleanup, run_server};
use clap::Parser;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(access_secret) = load_secret(ACCESS_SECRET_ENV, args.access_secret_file.as_deref())
    else {
        std::process::exit(1);
    };
    let Some(refresh_secret) =
        load_secret(REFRESH_SECRET_ENV, args.refresh_secret_file.as_deref())
    else {
        std::process::exit(1);
    };

    if validate_settings(&args, &access_secret, &refresh_secret).is_none() {
        std::process::exit(1);
    }

    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    let config = build_config(&args, db, access_secret, refresh_secret);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    let local_addr = listener.local_addr().unwrap_or_else(|e| {
        error!(error = %e, "Failed to read local address");
        std::process::exit(1);
    });

    let _cleanup = init_cleanup(&config).await;

    info!(address = %local_addr, "Listening");

    if let Err(e) = run_server(config, listener).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
