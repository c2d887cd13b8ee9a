use dotenvy::dotenv;
use http::header::{HeaderValue, CACHE_CONTROL};
use lettre::message::Mailbox;
use sqlx::sqlite::SqlitePoolOptions;
use std::env;
use std::net::SocketAddr;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;

use autoperry::services::mailer::Mailer;
use autoperry::web::routes;
use autoperry::web::state::AppState;

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt::init();
    info!("autoperry build {}", env!("AUTOPERRY_BUILD_ID"));

    let db_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = SqlitePoolOptions::new()
        .connect(&db_url)
        .await
        .expect("can't connect to the database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations failed");

    let base_url = env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
    let from: Mailbox = env::var("FROM_EMAIL")
        .unwrap_or_else(|_| "AutoPerry <autoperry@localhost>".to_string())
        .parse()
        .expect("FROM_EMAIL must be a valid mailbox");
    // Without a relay configured the mailer logs instead of sending
    let mailer = match (
        env::var("SMTP_RELAY"),
        env::var("SMTP_USERNAME"),
        env::var("SMTP_PASSWORD"),
    ) {
        (Ok(relay), Ok(username), Ok(password)) => {
            Mailer::new(&relay, username, password, from, base_url)
                .expect("can't set up the SMTP transport")
        }
        _ => {
            info!("SMTP_RELAY not configured; email is disabled");
            Mailer::disabled(from, base_url)
        }
    };

    let state = AppState {
        pool,
        mailer,
        secret: env::var("SECRET_KEY").expect("SECRET_KEY must be set"),
    };

    let app = routes::router(state)
        .nest_service("/assets", ServeDir::new("assets"))
        .layer(SetResponseHeaderLayer::if_not_present(
            CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(CatchPanicLayer::new());

    let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .expect("can't parse host/port");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("can't bind the listen address");
    info!("listening on http://{}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}
