use std::fmt::{Display, Formatter};
use std::str::FromStr;

use sha2::{Digest, Sha256};

use crate::{Error, Result};

pub const MAX_NAME_LEN: usize = 30;
pub const MAX_BIO_LEN: usize = 300;
pub const MAX_EMAIL_LEN: usize = 30;
pub const MAX_AVATAR_LEN: usize = 150;

const GRAVATAR_PREFIX: &str = "https://www.gravatar.com/avatar/";

pub fn required_text(value: &str, max_len: usize, missing: &str, too_long: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::validation(missing));
    }
    if value.chars().count() > max_len {
        return Err(Error::validation(too_long));
    }
    Ok(value.to_owned())
}

pub fn user_name(name: &str) -> Result<String> {
    required_text(name, MAX_NAME_LEN, "Please provide a name", "Your name can have at most 30 characters")
}

pub fn bio(bio: &str) -> Result<String> {
    required_text(
        bio,
        MAX_BIO_LEN,
        "Please provide some information about yourself",
        "Your bio can have at most 300 characters",
    )
}

pub fn email(email: &str) -> Result<String> {
    let email = required_text(
        email,
        MAX_EMAIL_LEN,
        "Please provide a valid email address",
        "Your email address can have at most 30 characters",
    )?;
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(Error::validation("Please provide a valid email address")),
    }
}

pub fn password(password: &str) -> Result<()> {
    if password.is_empty() {
        return Err(Error::validation("Please provide a password"));
    }
    Ok(())
}

/// A Gravatar is only accepted for the email address it belongs to.
pub fn avatar(avatar: &str, email: &str) -> Result<String> {
    if avatar.trim().is_empty() {
        return Err(Error::validation("Please choose a profile avatar"));
    }
    let avatar: Avatar = avatar.trim().parse()?;
    if matches!(avatar, Avatar::Gravatar(_)) && avatar != Avatar::gravatar(email) {
        return Err(Error::validation("This Gravatar does not belong to your email address"));
    }
    Ok(avatar.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Avatar {
    Duck,
    Kitten,
    Puppy,
    Gravatar(String),
}

impl Avatar {
    pub fn gravatar(email: &str) -> Self {
        let digest = Sha256::digest(email.trim().to_lowercase().as_bytes());
        Avatar::Gravatar(hex::encode(digest))
    }
}

impl Display for Avatar {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Avatar::Duck => f.write_str("/duck.jpg"),
            Avatar::Kitten => f.write_str("/kitten.jpg"),
            Avatar::Puppy => f.write_str("/puppy.jpg"),
            Avatar::Gravatar(hash) => write!(f, "{GRAVATAR_PREFIX}{hash}"),
        }
    }
}

impl FromStr for Avatar {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "/duck.jpg" => return Ok(Avatar::Duck),
            "/kitten.jpg" => return Ok(Avatar::Kitten),
            "/puppy.jpg" => return Ok(Avatar::Puppy),
            _ => {}
        };

        let hash = match s.strip_prefix(GRAVATAR_PREFIX) {
            Some(hash) => hash,
            None => return Err(Error::validation("Please choose one of the offered avatars")),
        };

        let is_digest = hash.len() == 64 && hash.chars().all(|c| c.is_ascii_hexdigit());
        if !is_digest || s.len() > MAX_AVATAR_LEN {
            return Err(Error::validation("Please choose one of the offered avatars"));
        }

        Ok(Avatar::Gravatar(hash.to_lowercase()))
    }
}
