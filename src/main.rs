use dotenvy::dotenv;
use log::info;

use myblog::{
    app::{bootstrap, create_router},
    config::AppConfig,
};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    env_logger::init();

    let config = AppConfig::from_env().expect("Invalid configuration");
    let addr = format!("0.0.0.0:{}", config.port);

    let state = bootstrap(config)
        .await
        .expect("Failed to initialize database");

    let app = create_router(state);

    info!("MyBlog server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind address");
    axum::serve(listener, app).await.expect("Server error");
}
