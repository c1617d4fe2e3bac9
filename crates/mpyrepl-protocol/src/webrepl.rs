//! WebREPL provisioning.
//!
//! Turning WebREPL on is done over an existing connection (normally serial):
//! write the password file, join a wireless network, start the daemon and
//! read its address back from what it prints. The daemon reports
//! `0.0.0.0` when the station interface has no address yet.

use std::ops::RangeInclusive;

use crate::commands::{python_str, RemoteCommand};
use crate::error::{ProtocolError, ProtocolResult};

/// File the WebREPL daemon reads its password from.
pub const WEBREPL_CONFIG_PATH: &str = "/webrepl_cfg.py";

/// Script run by the interpreter at every reset.
pub const BOOT_SCRIPT_PATH: &str = "/boot.py";

/// Password lengths the daemon accepts.
pub const WEBREPL_PASSWORD_LEN: RangeInclusive<usize> = 4..=9;

/// Check a WebREPL password before anything is written to the device.
pub fn validate_webrepl_password(password: &str) -> ProtocolResult<()> {
    let length = password.chars().count();
    if WEBREPL_PASSWORD_LEN.contains(&length) {
        Ok(())
    } else {
        Err(ProtocolError::InvalidWebReplPassword { length })
    }
}

/// Content of [`WEBREPL_CONFIG_PATH`].
pub fn webrepl_config(password: &str) -> String {
    format!("PASS={}\n", python_str(password))
}

/// Block appended to [`BOOT_SCRIPT_PATH`] so the daemon comes back after a
/// reset. It joins the network and gives the link about 4.5 seconds to come
/// up before starting WebREPL.
pub fn webrepl_boot_block(ssid: &str, password: &str) -> String {
    let connect = RemoteCommand::ConnectWlan {
        ssid: ssid.to_string(),
        password: password.to_string(),
    };
    format!(
        "\n{}\nimport webrepl\nimport time\nt=9\nwhile t>0:\n if w.isconnected():\n  webrepl.start()\n  break\n t=t-1\n time.sleep_ms(500)\n",
        connect.to_code()
    )
}

/// Find the daemon address in the output of [`RemoteCommand::StartWebRepl`].
///
/// Firmware prints either `ws://a.b.c.d:port` or, in newer releases,
/// `http://a.b.c.d:port/`; both are returned as a `ws://` URL.
pub fn parse_webrepl_url(output: &str) -> ProtocolResult<String> {
    let (host, port) = ["ws://", "http://"]
        .into_iter()
        .flat_map(|scheme| {
            output
                .match_indices(scheme)
                .map(move |(start, _)| &output[start + scheme.len()..])
        })
        .find_map(host_and_port)
        .ok_or(ProtocolError::WebReplNotStarted)?;
    if host == "0.0.0.0" {
        return Err(ProtocolError::WebReplNotStarted);
    }
    Ok(format!("ws://{}:{}", host, port))
}

/// Split a leading dotted quad and port off `text`.
fn host_and_port(text: &str) -> Option<(&str, &str)> {
    let bytes = text.as_bytes();
    let mut pos = 0;
    for separator in [b'.', b'.', b'.', b':'] {
        pos += digits_at(bytes, pos)?;
        if bytes.get(pos) != Some(&separator) {
            return None;
        }
        pos += 1;
    }
    let host_end = pos - 1;
    let port_len = digits_at(bytes, pos)?;
    Some((&text[..host_end], &text[pos..pos + port_len]))
}

fn digits_at(bytes: &[u8], pos: usize) -> Option<usize> {
    let count = bytes[pos.min(bytes.len())..]
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .count();
    (count > 0).then_some(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_length_bounds() {
        assert!(validate_webrepl_password("abcd").is_ok());
        assert!(validate_webrepl_password("abcdefghi").is_ok());
        assert_eq!(
            validate_webrepl_password("abc"),
            Err(ProtocolError::InvalidWebReplPassword { length: 3 })
        );
        assert_eq!(
            validate_webrepl_password("abcdefghij"),
            Err(ProtocolError::InvalidWebReplPassword { length: 10 })
        );
    }

    #[test]
    fn test_config_quotes_password() {
        assert_eq!(webrepl_config("pa'ss"), "PASS='pa\\'ss'\n");
    }

    #[test]
    fn test_boot_block_starts_daemon_after_connect() {
        let block = webrepl_boot_block("home", "secret");
        assert!(block.starts_with("\nimport network\nw=network.WLAN(network.STA_IF)\n"));
        assert!(block.contains("w.connect('home','secret')\nimport webrepl\n"));
        assert!(block.ends_with("  webrepl.start()\n  break\n t=t-1\n time.sleep_ms(500)\n"));
    }

    #[test]
    fn test_parse_ws_url() {
        let output = "WebREPL daemon started on ws://192.168.4.1:8266\r\nStarted webrepl in normal mode\r\n";
        assert_eq!(parse_webrepl_url(output).unwrap(), "ws://192.168.4.1:8266");
    }

    #[test]
    fn test_parse_http_url() {
        let output = "WebREPL server started on http://10.0.0.7:8266/\r\n";
        assert_eq!(parse_webrepl_url(output).unwrap(), "ws://10.0.0.7:8266");
    }

    #[test]
    fn test_unbound_address_is_not_started() {
        let output = "WebREPL daemon started on ws://0.0.0.0:8266\r\n";
        assert_eq!(parse_webrepl_url(output), Err(ProtocolError::WebReplNotStarted));
    }

    #[test]
    fn test_skips_malformed_candidates() {
        let output = "ws://host:1 then ws://1.2.3:4 then ws://1.2.3.4:5";
        assert_eq!(parse_webrepl_url(output).unwrap(), "ws://1.2.3.4:5");
        assert_eq!(parse_webrepl_url("ws://1.2.3.4:"), Err(ProtocolError::WebReplNotStarted));
        assert_eq!(parse_webrepl_url(""), Err(ProtocolError::WebReplNotStarted));
    }
}
