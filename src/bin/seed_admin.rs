//! Creates the default admin account if it does not exist yet.
//!
//! Usage: seed_admin <email> <password>

use anyhow::{anyhow, Context};
use clinic_booking::{auth::hash_password, config::Config, db, models::Role};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().init();

    let mut args = std::env::args().skip(1);
    let (Some(email), Some(password)) = (args.next(), args.next()) else {
        return Err(anyhow!("Usage: seed_admin <email> <password>"));
    };

    let cfg = Config::from_env()?;
    let pool = db::connect_pg(&cfg.database_url).await?;

    let phc = hash_password(&password).map_err(|e| anyhow!("argon2 hash error: {e}"))?;
    let username = email.split('@').next().unwrap_or(&email).to_string();

    let inserted = sqlx::query(
        r#"
        INSERT INTO app_user (email, username, full_name, password_hash, role)
        VALUES ($1, $2, 'System Administrator', $3, $4)
        ON CONFLICT (email) DO NOTHING
        "#,
    )
    .bind(&email)
    .bind(&username)
    .bind(&phc)
    .bind(Role::Admin.code())
    .execute(&pool)
    .await
    .context("inserting admin user")?
    .rows_affected();

    if inserted == 0 {
        tracing::info!(%email, "admin already exists");
    } else {
        tracing::info!(%email, "admin created");
    }
    Ok(())
}
