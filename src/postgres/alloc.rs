//! Host port and password allocation for new instances.

use std::net::{Ipv4Addr, TcpListener};

use rand::RngCore;
use rand::rngs::OsRng;
use secrecy::SecretString;

use crate::postgres::error::{PostgresError, Result};

/// Length of generated passwords.
pub const PASSWORD_LENGTH: usize = 32;

const PASSWORD_LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Largest multiple of the alphabet size that fits in a byte. Bytes at or
/// above it are rejected so every letter is equally likely.
const ACCEPT_BELOW: u8 = (256 / PASSWORD_LETTERS.len() * PASSWORD_LETTERS.len()) as u8;

/// Ask the OS for a free loopback port.
///
/// The listener is dropped before returning, so another process may claim
/// the port before the container binds it.
pub fn random_port() -> Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).map_err(|e| {
        PostgresError::Allocation {
            resource: "port",
            reason: e.to_string(),
        }
    })?;
    let port = listener
        .local_addr()
        .map_err(|e| PostgresError::Allocation {
            resource: "port",
            reason: e.to_string(),
        })?
        .port();
    Ok(port)
}

/// Generate a [`PASSWORD_LENGTH`]-letter password from `[A-Za-z]` using the
/// OS random source.
pub fn random_password() -> Result<SecretString> {
    let mut password = String::with_capacity(PASSWORD_LENGTH);
    let mut buf = [0u8; PASSWORD_LENGTH];

    while password.len() < PASSWORD_LENGTH {
        OsRng
            .try_fill_bytes(&mut buf)
            .map_err(|e| PostgresError::Allocation {
                resource: "password",
                reason: e.to_string(),
            })?;

        for &b in buf.iter().filter(|&&b| b < ACCEPT_BELOW) {
            if password.len() == PASSWORD_LENGTH {
                break;
            }
            password.push(PASSWORD_LETTERS[usize::from(b) % PASSWORD_LETTERS.len()] as char);
        }
    }

    Ok(SecretString::from(password))
}
