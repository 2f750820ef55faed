//! Actor token minting utility for Helpline
//!
//! Signs a bearer token with `JWT_SECRET` so the API and the `/chat` socket
//! can be exercised locally without an identity provider.
//!
//! Usage:
//!   cargo run --bin issue-token -- --identity amy@example.com
//!   cargo run --bin issue-token -- --identity ops@example.com --role admin --name Dana

use std::env;

use anyhow::{bail, Context};
use helpline_api::auth::JwtManager;
use helpline_shared::{Actor, ActorRole};

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let mut identity = None;
    let mut role = ActorRole::User;
    let mut name = None;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--identity" => identity = args.next(),
            "--role" => {
                let raw = args.next().context("--role needs a value")?;
                role = raw.parse().context("--role must be user or admin")?;
            }
            "--name" => name = args.next(),
            "-h" | "--help" => {
                println!("Usage: issue-token --identity <id> [--role user|admin] [--name <display name>]");
                return Ok(());
            }
            other => bail!("Unknown argument: {other}"),
        }
    }

    let identity = identity.context("--identity is required")?;
    let secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
    if secret.len() < 32 {
        bail!("JWT_SECRET must be at least 32 characters");
    }
    let expiry_hours = env::var("JWT_EXPIRY_HOURS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(24);

    let jwt = JwtManager::new(&secret, expiry_hours);
    let (token, jti) = jwt.generate_token(&Actor {
        identity,
        role,
        display_name: name,
    })?;

    eprintln!("jti: {jti}");
    println!("{token}");
    Ok(())
}
