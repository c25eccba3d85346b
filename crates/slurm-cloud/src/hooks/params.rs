use std::fmt::{Display, Formatter};

use thiserror::Error;

const IMAGE: &str = "image";
const FLAVOR: &str = "flavor";
const KEYPAIR: &str = "keypair";
const NETWORK: &str = "network";

/// Launch parameters of a node, declared as `key=value` node features in the scheduler
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchParams {
    pub image: String,
    pub flavor: String,
    pub keypair: String,
    pub network: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamsError {
    #[error("feature {0:?} is not in key=value form")]
    Malformed(String),
    #[error("unknown feature key {0:?}")]
    UnknownKey(String),
    #[error("feature key {0:?} is set more than once")]
    DuplicateKey(String),
    #[error("missing required feature(s): {}", .0.join(", "))]
    Missing(Vec<&'static str>),
}

impl LaunchParams {
    /// Parses the features of a node.
    ///
    /// Every required key is checked, so a [`ParamsError::Missing`] names all absent keys at
    /// once. Keys with an empty value count as missing.
    pub fn parse<S: AsRef<str>>(features: &[S]) -> Result<Self, ParamsError> {
        let mut image = None;
        let mut flavor = None;
        let mut keypair = None;
        let mut network = None;

        for feature in features {
            let feature = feature.as_ref().trim();
            if feature.is_empty() || feature == "(null)" {
                continue;
            }
            let (key, value) = feature
                .split_once('=')
                .ok_or_else(|| ParamsError::Malformed(feature.to_string()))?;
            let slot = match key.trim() {
                IMAGE => &mut image,
                FLAVOR => &mut flavor,
                KEYPAIR => &mut keypair,
                NETWORK => &mut network,
                key => return Err(ParamsError::UnknownKey(key.to_string())),
            };
            if slot.is_some() {
                return Err(ParamsError::DuplicateKey(key.trim().to_string()));
            }
            *slot = Some(value.trim().to_string());
        }

        let mut missing = vec![];
        let mut take = |key: &'static str, value: Option<String>| match value {
            Some(value) if !value.is_empty() => value,
            _ => {
                missing.push(key);
                String::new()
            }
        };
        let params = LaunchParams {
            image: take(IMAGE, image),
            flavor: take(FLAVOR, flavor),
            keypair: take(KEYPAIR, keypair),
            network: take(NETWORK, network),
        };
        if missing.is_empty() {
            Ok(params)
        } else {
            Err(ParamsError::Missing(missing))
        }
    }
}

impl Display for LaunchParams {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "image={}, flavor={}, keypair={}, network={}",
            self.image, self.flavor, self.keypair, self.network
        )
    }
}
