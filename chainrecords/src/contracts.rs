use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use ethers::abi::{Abi, Event, Function, Token};
use ethers::types::{Address, Bytes, H256};
use serde::Deserialize;

use crate::connection::ContractCaller;

pub type ContractEventTopic = H256;

#[derive(Debug, thiserror::Error)]
pub enum InterfaceError {
    #[error("cannot parse interface {name}: {reason}")]
    Parse { name: String, reason: String },
    #[error("cannot read interface file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Shared interface descriptor. Parsed once and reused by every contract
/// handle bound to it, including every child discovered at runtime.
#[derive(Debug, Clone)]
pub struct Interface {
    pub name: String,
    abi: Abi,
    scaled_params: HashMap<String, u8>,
}

impl Interface {
    pub fn from_human_readable(name: &str, signatures: &[&str]) -> Result<Self, InterfaceError> {
        let abi = ethers::abi::parse_abi(signatures).map_err(|error| InterfaceError::Parse {
            name: name.to_string(),
            reason: error.to_string(),
        })?;

        Ok(Self::new(name, abi))
    }

    /// Parses a standard JSON ABI (the artifact format solc/forge emit)
    pub fn from_json(name: &str, json: &str) -> Result<Self, InterfaceError> {
        let abi: Abi = serde_json::from_str(json).map_err(|error| InterfaceError::Parse {
            name: name.to_string(),
            reason: error.to_string(),
        })?;

        Ok(Self::new(name, abi))
    }

    fn new(name: &str, abi: Abi) -> Self {
        Self {
            name: name.to_string(),
            abi,
            scaled_params: HashMap::new(),
        }
    }

    /// Marks uint params whose display form is scaled down by `decimals`
    pub fn with_scaled_params(mut self, params: &[&str], decimals: u8) -> Self {
        for param in params {
            self.scaled_params.insert(param.to_string(), decimals);
        }

        self
    }

    pub fn get_event(&self, name: &str) -> Option<&Event> {
        self.abi.events_by_name(name).ok().and_then(|events| events.first())
    }

    pub fn get_events(&self) -> Vec<&Event> {
        self.abi.events().collect()
    }

    pub fn get_event_by_topic(&self, topic: &ContractEventTopic) -> Option<&Event> {
        self.abi.events().find(|event| event.signature() == *topic)
    }

    /// Topics of the named events. Unknown names are ignored.
    pub fn get_event_topics(&self, names: &[String]) -> Vec<ContractEventTopic> {
        names
            .iter()
            .filter_map(|name| self.get_event(name))
            .map(|event| event.signature())
            .collect()
    }

    pub fn get_all_event_topics(&self) -> Vec<ContractEventTopic> {
        self.abi.events().map(|event| event.signature()).collect()
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.abi.functions_by_name(name).ok().and_then(|functions| functions.first())
    }

    pub fn get_decimals_for(&self, param: &str) -> Option<u8> {
        self.scaled_params.get(param).copied()
    }
}

/// Per-contract configuration entry, as supplied at startup
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ContractConfig {
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    /// Human-readable ABI signatures. Overrides the built-in interface of the
    /// same name when present.
    #[serde(default)]
    pub abi: Option<Vec<String>>,
    /// Path to a JSON ABI file. Takes precedence over `abi`.
    #[serde(default)]
    pub abi_path: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl ContractConfig {
    pub fn new(name: &str, address: &str) -> Self {
        Self {
            name: name.to_string(),
            address: Some(address.to_string()),
            abi: None,
            abi_path: None,
            active: true,
        }
    }

    pub fn with_abi(mut self, signatures: &[&str]) -> Self {
        self.abi = Some(signatures.iter().map(|s| s.to_string()).collect());

        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;

        self
    }

    pub fn without_address(mut self) -> Self {
        self.address = None;

        self
    }

    /// Resolves the configured interface, if the entry declares one
    pub fn load_interface(&self) -> Option<Result<Interface, InterfaceError>> {
        if let Some(path) = &self.abi_path {
            return Some(
                std::fs::read_to_string(path)
                    .map_err(|source| InterfaceError::Io {
                        path: path.clone(),
                        source,
                    })
                    .and_then(|json| Interface::from_json(&self.name, &json)),
            );
        }

        self.abi.as_ref().map(|signatures| {
            let signatures: Vec<_> = signatures.iter().map(|s| s.as_str()).collect();

            Interface::from_human_readable(&self.name, &signatures)
        })
    }
}

/// A top-level contract bound to its address and interface
#[derive(Clone)]
pub struct ContractBinding {
    pub name: String,
    pub address: Address,
    pub interface: Arc<Interface>,
    pub active: bool,
}

impl ContractBinding {
    pub fn get_handle(&self) -> ContractHandle {
        ContractHandle::at(self.address, self.interface.clone())
    }
}

impl Debug for ContractBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractBinding")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("interface", &self.interface.name)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ContractReadError {
    #[error("function {0} is not part of the interface")]
    UnknownFunction(String),
    #[error("cannot encode call to {function}: {reason}")]
    Encode { function: String, reason: String },
    #[error("call to {function} failed: {reason}")]
    Call { function: String, reason: String },
    #[error("cannot decode output of {function}: {reason}")]
    Decode { function: String, reason: String },
}

/// A contract at an address, speaking a shared interface
#[derive(Debug, Clone)]
pub struct ContractHandle {
    pub address: Address,
    pub interface: Arc<Interface>,
}

impl ContractHandle {
    pub fn at(address: Address, interface: Arc<Interface>) -> Self {
        Self { address, interface }
    }

    /// Issues a read-only call and decodes its outputs
    pub async fn read(
        &self,
        caller: &dyn ContractCaller,
        function_name: &str,
        args: &[Token],
    ) -> Result<Vec<Token>, ContractReadError> {
        let function = self
            .interface
            .get_function(function_name)
            .ok_or_else(|| ContractReadError::UnknownFunction(function_name.to_string()))?;

        let data = function.encode_input(args).map_err(|error| ContractReadError::Encode {
            function: function_name.to_string(),
            reason: error.to_string(),
        })?;

        let output = caller.eth_call(self.address, Bytes::from(data)).await.map_err(|error| {
            ContractReadError::Call {
                function: function_name.to_string(),
                reason: error.to_string(),
            }
        })?;

        function.decode_output(&output).map_err(|error| ContractReadError::Decode {
            function: function_name.to_string(),
            reason: error.to_string(),
        })
    }

    /// Reads a function returning a single value
    pub async fn read_one(
        &self,
        caller: &dyn ContractCaller,
        function_name: &str,
    ) -> Result<Token, ContractReadError> {
        self.read(caller, function_name, &[]).await?.into_iter().next().ok_or_else(|| {
            ContractReadError::Decode {
                function: function_name.to_string(),
                reason: "empty output".to_string(),
            }
        })
    }
}
