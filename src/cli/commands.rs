//! Interactive/one-shot commands of `buildops_cli` and their execution.

use anyhow::{anyhow, Context, Result};
use reqwest::Method;
use serde_json::Value;

use crate::http::RequestOptions;
use crate::session::{AuthSessionManager, Credentials, SessionState};
use super::table::render_table;

pub const HELP: &str = "\
Commands:
  login <user> <password>        sign in and store the session tokens
  logout                         sign out and forget tokens and tenant
  whoami                         show the signed-in user's claims
  tenant [<id>]                  show or switch the active tenant
  get <path>                     GET a path (relative to the API base) or absolute URL
  delete <path>                  DELETE a path
  post|put|patch <path> <json>   send a JSON body
  refresh                        force an access token refresh
  status                         show API base, auth mode, tenant and session state
  help                           show this help
  quit | exit                    leave the interpreter";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Login { username: String, password: String },
    Logout,
    Whoami,
    Tenant(Option<String>),
    Send { method: Method, path: String, body: Option<Value> },
    Refresh,
    Status,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Command> {
    let line = line.trim();
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((h, r)) => (h, r.trim()),
        None => (line, ""),
    };
    let cmd = match head.to_ascii_lowercase().as_str() {
        "login" => {
            let mut parts = rest.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(u), Some(p)) => Command::Login { username: u.to_string(), password: p.to_string() },
                _ => return Err(anyhow!("usage: login <user> <password>")),
            }
        }
        "logout" => Command::Logout,
        "whoami" => Command::Whoami,
        "tenant" => Command::Tenant(if rest.is_empty() { None } else { Some(rest.to_string()) }),
        "get" | "delete" => {
            if rest.is_empty() { return Err(anyhow!("usage: {} <path>", head.to_ascii_lowercase())); }
            let method = if head.eq_ignore_ascii_case("get") { Method::GET } else { Method::DELETE };
            Command::Send { method, path: rest.to_string(), body: None }
        }
        "post" | "put" | "patch" => {
            let (path, json) = rest
                .split_once(char::is_whitespace)
                .map(|(p, j)| (p, j.trim()))
                .unwrap_or((rest, ""));
            if path.is_empty() { return Err(anyhow!("usage: {} <path> <json>", head.to_ascii_lowercase())); }
            let body = if json.is_empty() {
                None
            } else {
                Some(serde_json::from_str(json).context("body is not valid JSON")?)
            };
            let method = match head.to_ascii_lowercase().as_str() {
                "post" => Method::POST,
                "put" => Method::PUT,
                _ => Method::PATCH,
            };
            Command::Send { method, path: path.to_string(), body }
        }
        "refresh" => Command::Refresh,
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        "" => return Err(anyhow!("empty command")),
        other => return Err(anyhow!("unknown command '{}'; type 'help'", other)),
    };
    Ok(cmd)
}

/// Run one command. Returns `false` when the interpreter should stop.
pub async fn execute(session: &AuthSessionManager, cmd: Command) -> Result<bool> {
    let client = session.client();
    match cmd {
        Command::Login { username, password } => {
            let claims = session.login(&Credentials::new(username, password)).await?;
            println!("signed in as {} {} <{}> role={}", claims.name, claims.surname, claims.email, claims.role.as_deref().unwrap_or("-"));
            if let Some(t) = client.tenant().get() { println!("tenant: {}", t); }
        }
        Command::Logout => {
            session.sign_out().await;
            println!("signed out");
        }
        Command::Whoami => match session.current_user() {
            Some(claims) => println!("{}", serde_json::to_string_pretty(&claims)?),
            None => println!("not signed in"),
        },
        Command::Tenant(None) => println!("tenant: {}", client.tenant().get().unwrap_or_else(|| "<none>".into())),
        Command::Tenant(Some(id)) => {
            session.switch_tenant(&id);
            println!("tenant: {}", id);
        }
        Command::Send { method, path, body } => {
            let mut opts = RequestOptions::new(method);
            if let Some(b) = body { opts = opts.json(b); }
            let value = client.request(&path, opts).await?;
            print_value(&value)?;
        }
        Command::Refresh => match client.refresher().ensure_refreshed().await {
            Some(_) => println!("access token refreshed"),
            None => println!("no session to refresh"),
        },
        Command::Status => {
            let cfg = client.config();
            println!("api: {} (auth mode: {})", cfg.api_base, cfg.auth_mode.as_str());
            println!("tenant: {}", client.tenant().get().unwrap_or_else(|| "<none>".into()));
            match session.state() {
                SessionState::Authenticated(c) => println!("session: signed in as {}", c.user_id),
                SessionState::Anonymous => println!("session: anonymous"),
            }
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

pub fn print_value(value: &Value) -> Result<()> {
    if std::env::var("BUILDOPS_OUTPUT").map(|v| v.eq_ignore_ascii_case("json")).unwrap_or(false) {
        println!("{}", serde_json::to_string_pretty(value)?);
        return Ok(());
    }
    match render_table(value) {
        Some(table) => print!("{}", table),
        None => match value {
            Value::Null => println!("(no content)"),
            Value::String(s) => println!("{}", s),
            other => println!("{}", serde_json::to_string_pretty(other)?),
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_commands() {
        assert_eq!(
            parse_command("login ada s3cret").unwrap(),
            Command::Login { username: "ada".into(), password: "s3cret".into() }
        );
        assert_eq!(parse_command("  TENANT acme ").unwrap(), Command::Tenant(Some("acme".into())));
        assert_eq!(parse_command("tenant").unwrap(), Command::Tenant(None));
        assert_eq!(
            parse_command("get /api/Vehicles?page=1").unwrap(),
            Command::Send { method: Method::GET, path: "/api/Vehicles?page=1".into(), body: None }
        );
        assert_eq!(
            parse_command(r#"post /api/Tools {"name": "drill", "qty": 2}"#).unwrap(),
            Command::Send { method: Method::POST, path: "/api/Tools".into(), body: Some(json!({"name": "drill", "qty": 2})) }
        );
        assert_eq!(parse_command("exit").unwrap(), Command::Quit);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_command("login onlyuser").is_err());
        assert!(parse_command("get").is_err());
        assert!(parse_command("put /api/Tools {broken").is_err());
        assert!(parse_command("drop table").is_err());
        assert!(parse_command("   ").is_err());
    }
}
