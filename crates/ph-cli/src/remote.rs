//! Remote helper arguments
//!
//! Git runs `git-remote-persistent-https <remote> <url>`, or just `<url>`
//! when the URL was given directly on the command line. The URL is
//! rewritten to plain `http` for the delegate, since the proxy does the
//! TLS upgrade; `persistent-http` marks a remote that must never be
//! upgraded.

use reqwest::Url;
use thiserror::Error;

/// Scheme that routes through the proxy without a TLS upgrade
pub const INSECURE_SCHEME: &str = "persistent-http";

/// Scheme handed to the delegate
pub const PLAIN_SCHEME: &str = "http";

/// Errors in the helper's command line
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Git passes one or two arguments
    #[error("expected 1 or 2 arguments (remote and URL), got {0}")]
    WrongArgCount(usize),

    /// The target address is not a URL
    #[error("invalid remote URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// A parsed remote helper invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteInvocation {
    /// Remote name, or the URL itself when git had no name for it
    pub alias: Option<String>,
    /// Target address with the scheme rewritten to `http`
    pub address: String,
    /// True for `persistent-http` remotes
    pub insecure: bool,
}

impl RemoteInvocation {
    /// Parse and rewrite the helper's positional arguments
    pub fn parse(args: &[String]) -> Result<Self, RemoteError> {
        let (alias, original) = match args {
            [address] => (None, address),
            [alias, address] => (Some(alias), address),
            _ => return Err(RemoteError::WrongArgCount(args.len())),
        };

        let (address, insecure) = rewrite_address(original)?;
        let alias = alias.map(|alias| {
            if alias == original {
                address.clone()
            } else {
                alias.clone()
            }
        });

        Ok(Self {
            alias,
            address,
            insecure,
        })
    }

    /// Arguments for the delegate, in the order git passed them
    pub fn delegate_args(&self) -> Vec<String> {
        self.alias
            .iter()
            .chain(std::iter::once(&self.address))
            .cloned()
            .collect()
    }
}

/// Replace the scheme with `http`, keeping the rest of the address verbatim
fn rewrite_address(original: &str) -> Result<(String, bool), RemoteError> {
    let url = Url::parse(original).map_err(|e| RemoteError::InvalidUrl {
        url: original.to_string(),
        reason: e.to_string(),
    })?;

    let insecure = url.scheme() == INSECURE_SCHEME;
    // The parser accepted it, so there is a scheme and a colon
    let rest = original
        .split_once(':')
        .map(|(_, rest)| rest)
        .unwrap_or_default();

    Ok((format!("{}:{}", PLAIN_SCHEME, rest), insecure))
}
