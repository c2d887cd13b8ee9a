//! The cron-driven half of AutoPerry: reminders, digests and adverts.
//! Every subcommand is a dry run unless `--really` is given.

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use lettre::message::Mailbox;
use sqlx::sqlite::SqlitePoolOptions;
use std::env;

use autoperry::services::jobs;
use autoperry::services::mailer::Mailer;

#[derive(Parser)]
#[command(name = "autoperry-jobs", about = "AutoPerry scheduled jobs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Remind organisers of their events a few days out
    OwnerReminders {
        #[arg(long)]
        really: bool,
    },
    /// Send helpers a digest of their upcoming commitments
    HelperReminders {
        /// Cover the rest of this week instead of next week
        #[arg(long)]
        thisweek: bool,
        #[arg(long)]
        really: bool,
    },
    /// Tell the administrators about accounts stuck awaiting approval
    AdminReminders {
        #[arg(long)]
        really: bool,
    },
    /// Advertise events still needing helpers to everyone who opted in
    Advert {
        #[arg(long, default_value_t = 2)]
        weeks: i64,
        #[arg(long)]
        really: bool,
    },
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let db_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = SqlitePoolOptions::new()
        .connect(&db_url)
        .await
        .expect("can't connect to the database");

    let base_url = env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
    let from: Mailbox = env::var("FROM_EMAIL")
        .unwrap_or_else(|_| "AutoPerry <autoperry@localhost>".to_string())
        .parse()
        .expect("FROM_EMAIL must be a valid mailbox");
    let mailer = match (
        env::var("SMTP_RELAY"),
        env::var("SMTP_USERNAME"),
        env::var("SMTP_PASSWORD"),
    ) {
        (Ok(relay), Ok(username), Ok(password)) => {
            Mailer::new(&relay, username, password, from, base_url)
                .expect("can't set up the SMTP transport")
        }
        _ => Mailer::disabled(from, base_url),
    };

    let now = chrono::Utc::now();
    let result = match cli.command {
        Command::OwnerReminders { really } => {
            jobs::owner_reminders(&pool, &mailer, really, now).await
        }
        Command::HelperReminders { thisweek, really } => {
            jobs::helper_digests(&pool, &mailer, thisweek, really, now).await
        }
        Command::AdminReminders { really } => {
            jobs::admin_reminders(&pool, &mailer, really, now).await
        }
        Command::Advert { weeks, really } => jobs::advert(&pool, &mailer, weeks, really, now).await,
    };

    match result {
        Ok(report) => {
            println!("candidates={} sent={}", report.candidates, report.sent);
        }
        Err(e) => {
            eprintln!("job failed: {}", e);
            std::process::exit(1);
        }
    }
}
