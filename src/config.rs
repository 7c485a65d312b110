use crate::error::AppError;
use anyhow::{bail, Result};
use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Required environment variables, checked at startup and by `--check`.
const REQUIRED_VARS: [&str; 4] = [
    "OPENAI_API_KEY",
    "TWILIO_ACCOUNT_SID",
    "TWILIO_AUTH_TOKEN",
    "TWILIO_WHATSAPP_NUMBER",
];

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub openai_api_key: String,

    /// Presence selects the asynchronous assistant-run reply mode.
    pub openai_assistant_id: Option<String>,

    pub twilio_account_sid: String,
    pub twilio_auth_token: String,

    /// Sending address, with or without the `whatsapp:` channel prefix.
    pub whatsapp_from: String,

    pub address: SocketAddr,
}
impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Ok(Self {
            openai_api_key: required("OPENAI_API_KEY")?,
            openai_assistant_id: optional("OPENAI_ASSISTANT_ID"),
            twilio_account_sid: required("TWILIO_ACCOUNT_SID")?,
            twilio_auth_token: required("TWILIO_AUTH_TOKEN")?,
            whatsapp_from: required("TWILIO_WHATSAPP_NUMBER")?,
            address: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port_from_env()?),
        })
    }
}

fn required(name: &'static str) -> Result<String, AppError> {
    optional(name).ok_or(AppError::MissingConfig(name))
}

fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn port_from_env() -> Result<u16, AppError> {
    match optional("PORT") {
        Some(value) => value
            .parse()
            .map_err(|_| AppError::InvalidConfig(format!("PORT is not a valid port: {value}"))),
        None => Ok(default_port()),
    }
}

fn default_port() -> u16 {
    5000
}

/// Console report for the `--check` CLI flag. Prints each required variable
/// with a masked value so keys are never echoed in full.
pub fn check_environment() -> Result<()> {
    println!("Checking environment variables...");
    println!("{}", "-".repeat(30));

    let mut missing = Vec::new();
    for name in REQUIRED_VARS {
        match optional(name) {
            Some(value) => println!("[ok] {name} is set: {}", mask(&value)),
            None => {
                println!("[!!] {name} is missing!");
                missing.push(name);
            }
        }
    }
    match optional("OPENAI_ASSISTANT_ID") {
        Some(value) => println!("[ok] OPENAI_ASSISTANT_ID is set (assistant mode): {}", mask(&value)),
        None => println!("[--] OPENAI_ASSISTANT_ID not set, using chat completions"),
    }

    println!("{}", "-".repeat(30));
    if missing.is_empty() {
        println!("All required environment variables are set!");
        Ok(())
    } else {
        bail!("Missing environment variables: {}", missing.join(", "));
    }
}

/// Shows the first and last four characters only.
fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "****".to_string()
    }
}
