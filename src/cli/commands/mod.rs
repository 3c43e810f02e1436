pub mod logging;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

use crate::session::parse_duration;

pub const ARG_PORT: &str = "port";
pub const ARG_DSN: &str = "dsn";
pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_ACCESS_TTL: &str = "access-ttl";
pub const ARG_REFRESH_TTL: &str = "refresh-ttl";
pub const ARG_HASH_COST: &str = "hash-cost";
pub const ARG_REQUEST_TIMEOUT: &str = "request-timeout";
pub const ARG_SWEEP_INTERVAL: &str = "sweep-interval";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("turnstile")
        .about("Session and token lifecycle service")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("TURNSTILE_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long("dsn")
                .help("Database connection string")
                .long_help(
                    "PostgreSQL connection string. When omitted, accounts and sessions are kept in memory and lost on restart.",
                )
                .env("TURNSTILE_DSN")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long("jwt-secret")
                .help("HMAC key used to sign access tokens (at least 32 bytes)")
                .env("TURNSTILE_JWT_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_ACCESS_TTL)
                .long("access-ttl")
                .help("Access token lifetime, example: 15m")
                .default_value("15m")
                .env("TURNSTILE_ACCESS_TTL")
                .value_parser(parse_duration),
        )
        .arg(
            Arg::new(ARG_REFRESH_TTL)
                .long("refresh-ttl")
                .help("Refresh token lifetime, example: 168h")
                .default_value("168h")
                .env("TURNSTILE_REFRESH_TTL")
                .value_parser(parse_duration),
        )
        .arg(
            Arg::new(ARG_HASH_COST)
                .long("hash-cost")
                .help("Argon2id iterations used when hashing new passwords")
                .default_value("2")
                .env("TURNSTILE_HASH_COST")
                .value_parser(clap::value_parser!(u32).range(1..=64)),
        )
        .arg(
            Arg::new(ARG_REQUEST_TIMEOUT)
                .long("request-timeout")
                .help("Per-request timeout, example: 10s")
                .default_value("10s")
                .env("TURNSTILE_REQUEST_TIMEOUT")
                .value_parser(parse_duration),
        )
        .arg(
            Arg::new(ARG_SWEEP_INTERVAL)
                .long("sweep-interval")
                .help("Purge expired refresh tokens on this interval, example: 1h (default: disabled)")
                .env("TURNSTILE_SWEEP_INTERVAL")
                .value_parser(parse_duration),
        );

    logging::with_args(command)
}
