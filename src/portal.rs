//! # Setup Portal
//!
//! A tiny HTTP/1.0 server the device runs while in configuration mode. The
//! user joins the device's access point, opens the address shown on the
//! panel and submits WiFi credentials, up to five coins and the refresh
//! interval.
//!
//! `GET` anything serves the form. `POST /submit` takes an
//! `application/x-www-form-urlencoded` body; a valid submission is answered
//! with "Settings Saved!" and handed to the controller, an invalid one gets a
//! `400` and the form stays up.
//!
//! The listener is non-blocking and [`ConfigPortal::poll`] handles at most one
//! connection per call, so the controller can keep watching the buttons
//! between polls.

use crate::coins::{CATALOG, MAX_COINS, UNSET};
use crate::settings::{Configuration, SettingsError};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::time::Duration;
use thiserror::Error;

/// Refresh intervals offered by the form, in minutes.
pub const REFRESH_CHOICES: [(u32, &str); 3] =
    [(15, "15 minutes"), (30, "30 minutes"), (60, "1 hour")];

const MAX_REQUEST: usize = 16 * 1024;
const CLIENT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum PortalError {
    #[error("portal socket error: {0}")]
    Io(#[from] io::Error),

    #[error("portal is not open")]
    NotOpen,
}

pub trait ConfigPortal {
    fn open(&mut self) -> Result<(), PortalError>;
    /// Serve at most one pending request. Returns the configuration once a
    /// valid form has been submitted.
    fn poll(&mut self) -> Result<Option<Configuration>, PortalError>;
}

/// A parsed HTTP request.
#[derive(Debug, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub body: String,
}

/// Parse a complete request. `None` until the headers and the whole body
/// announced by `Content-Length` are present.
pub fn parse_request(raw: &[u8]) -> Option<Request> {
    let text = String::from_utf8_lossy(raw);
    let (head, body) = text.split_once("\r\n\r\n")?;
    let mut lines = head.lines();
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next().unwrap_or("/").to_string();

    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    if body.len() < content_length {
        return None;
    }
    Some(Request {
        method,
        path,
        body: body.get(..content_length).unwrap_or(body).to_string(),
    })
}

/// Decode `application/x-www-form-urlencoded` text.
pub fn parse_form(body: &str) -> HashMap<String, String> {
    body.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (percent_decode(key), percent_decode(value))
        })
        .collect()
}

/// `+` is a space, `%XX` a byte. Malformed escapes are kept literally.
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => match (hex(bytes[i + 1]), hex(bytes[i + 2])) {
                (Some(high), Some(low)) => {
                    out.push(high << 4 | low);
                    i += 2;
                }
                _ => out.push(b'%'),
            },
            other => out.push(other),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex(digit: u8) -> Option<u8> {
    (digit as char).to_digit(16).map(|d| d as u8)
}

/// Build a configuration from submitted form fields.
pub fn configuration_from_form(
    form: &HashMap<String, String>,
) -> Result<Configuration, SettingsError> {
    let field = |name: &str| form.get(name).map(String::as_str).unwrap_or("");

    let refresh = field("refresh").trim().parse::<u32>().map_err(|_| {
        SettingsError::Invalid(format!("bad refresh interval '{}'", field("refresh")))
    })?;

    let coins = (1..=MAX_COINS)
        .map(|i| field(&format!("coin{i}")).trim().to_string())
        .filter(|coin| !coin.is_empty() && coin != UNSET)
        .collect();

    Configuration::new(field("ssid"), field("password"), refresh, coins)
}

/// The settings form page.
pub fn form_page() -> String {
    let options: String = CATALOG
        .iter()
        .map(|coin| format!(r#"<option value="{}">{}</option>"#, coin.id, coin.name))
        .collect();
    let selects: String = (1..=MAX_COINS)
        .map(|i| {
            format!(r#"<select name="coin{i}"><option>{UNSET}</option>{options}</select><br>"#)
        })
        .collect();
    let refresh: String = REFRESH_CHOICES
        .iter()
        .map(|(minutes, label)| format!(r#"<option value="{minutes}">{label}</option>"#))
        .collect();

    format!(
        r#"<!DOCTYPE html><html><head><title>Crypto Ticker Setup</title></head>
<body><h1>Crypto Ticker Setup</h1>
<form action="/submit" method="post">
<h2>Wi-Fi Settings</h2>
<label for="ssid">SSID:</label><br><input type="text" id="ssid" name="ssid"><br>
<label for="password">Password:</label><br><input type="password" id="password" name="password"><br>
<h2>Crypto Coins (up to {MAX_COINS})</h2>
{selects}
<h2>Refresh Interval</h2>
<select name="refresh">{refresh}</select><br><br>
<input type="submit" value="Save Settings">
</form></body></html>"#
    )
}

/// Escape text for inclusion in HTML.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

/// The form again, headed by why the last submission was rejected.
pub fn rejection_page(error: &SettingsError) -> String {
    format!("<h1>{}</h1>{}", escape_html(&error.to_string()), form_page())
}

const SAVED_PAGE: &str =
    "<html><body><h1>Settings Saved!</h1><p>Device will now reboot.</p></body></html>";

fn respond(stream: &mut TcpStream, status: &str, body: &str) -> io::Result<()> {
    write!(
        stream,
        "HTTP/1.0 {status}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )?;
    stream.flush()
}

/// Portal served over a plain TCP listener.
pub struct HttpPortal {
    bind_address: String,
    listener: Option<TcpListener>,
}

impl HttpPortal {
    pub fn new(bind_address: &str) -> Self {
        Self {
            bind_address: bind_address.to_string(),
            listener: None,
        }
    }

    fn read_request(stream: &mut TcpStream) -> io::Result<Option<Request>> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(CLIENT_TIMEOUT))?;

        let mut raw = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk)?;
            if n == 0 {
                return Ok(parse_request(&raw));
            }
            raw.extend_from_slice(&chunk[..n]);
            if let Some(request) = parse_request(&raw) {
                return Ok(Some(request));
            }
            if raw.len() > MAX_REQUEST {
                return Ok(None);
            }
        }
    }

    fn handle(stream: &mut TcpStream) -> io::Result<Option<Configuration>> {
        let Some(request) = Self::read_request(stream)? else {
            respond(stream, "400 Bad Request", "<h1>Bad request</h1>")?;
            return Ok(None);
        };
        debug!("portal: {} {}", request.method, request.path);

        if request.method == "POST" && request.path == "/submit" {
            match configuration_from_form(&parse_form(&request.body)) {
                Ok(config) => {
                    respond(stream, "200 OK", SAVED_PAGE)?;
                    info!("Settings submitted for SSID '{}'", config.ssid);
                    return Ok(Some(config));
                }
                Err(e) => {
                    warn!("Rejected submission: {}", e);
                    respond(stream, "400 Bad Request", &rejection_page(&e))?;
                    return Ok(None);
                }
            }
        }

        respond(stream, "200 OK", &form_page())?;
        Ok(None)
    }
}

impl ConfigPortal for HttpPortal {
    fn open(&mut self) -> Result<(), PortalError> {
        let listener = TcpListener::bind(&self.bind_address)?;
        listener.set_nonblocking(true)?;
        info!("Setup portal listening on {}", listener.local_addr()?);
        self.listener = Some(listener);
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<Configuration>, PortalError> {
        let listener = self.listener.as_ref().ok_or(PortalError::NotOpen)?;
        let (mut stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        debug!("portal connection from {}", peer);

        // Client errors are logged, not propagated.
        match Self::handle(&mut stream) {
            Ok(result) => Ok(result),
            Err(e) => {
                warn!("portal client {}: {}", peer, e);
                Ok(None)
            }
        }
    }
}
