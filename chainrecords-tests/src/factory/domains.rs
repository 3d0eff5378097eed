use std::str::FromStr;

use chainrecords::domains::{ChildSource, FactorySource};
use chainrecords::{Chain, ChainId, Config, ContractConfig, Domain, Interface};
use ethers::types::Address;

pub const FACTORY_ADDRESS: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";
pub const CHILD_A_ADDRESS: &str = "0x00000000000000000000000000000000000000a1";
pub const CHILD_B_ADDRESS: &str = "0x00000000000000000000000000000000000000b2";

pub const FACTORY_ABI: &[&str] = &[
    "event ChildCreated(address indexed child, uint256 salt)",
    "event FeeUpdated(uint256 newFee)",
];

pub const CHILD_ABI: &[&str] = &[
    "event Ping(address indexed from, uint256 value)",
    "event Pong(uint256 value)",
];

pub fn address(address: &str) -> Address {
    Address::from_str(address).unwrap()
}

pub fn factory_interface() -> Interface {
    Interface::from_human_readable("Factory", FACTORY_ABI).unwrap()
}

pub fn child_interface() -> Interface {
    Interface::from_human_readable("Child", CHILD_ABI).unwrap()
}

/// A factory spawning children, writing to streams `factory` and `child`
pub fn factory_domain() -> Domain {
    Domain::new("test")
        .add_factory(
            FactorySource::new("Factory", "factory", factory_interface())
                .with_creation_event("ChildCreated", "child"),
        )
        .with_child(ChildSource::new("Child", "child", child_interface()))
}

pub fn test_config(store_dir: &std::path::Path) -> Config {
    Config::new(Chain::new(ChainId::Mainnet, "http://localhost:8545"), store_dir)
        .add_contract(ContractConfig::new("Factory", FACTORY_ADDRESS))
        .with_chunk_delay_ms(0)
        .with_connect_retries(3, 1)
        .with_health_check(10, 20)
}
