#![allow(dead_code)]

use rust_decimal::Decimal;
use securepay::application::network::{Network, Stores};
use securepay::application::risk::StaticScorer;
use securepay::config::Config;
use securepay::domain::card::CardRecord;
use securepay::domain::money::{Amount, Balance};
use securepay::infrastructure::cipher::CipherService;
use securepay::infrastructure::in_memory::InMemoryLedgerStore;
use rust_decimal_macros::dec;
use std::path::Path;
use tokio::task::JoinHandle;

pub const VISA: &str = "4111111111111111";
pub const AMEX: &str = "340000000000009";
pub const BLOCKED: &str = "6060123456789019";

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.channel.poll_interval_ms = 10;
    config.merchant.response_timeout_secs = 5;
    config.risk = config.risk.without_random_rolls();
    config
}

pub fn seeded_ledger() -> InMemoryLedgerStore {
    InMemoryLedgerStore::with_cards([
        (
            VISA.to_string(),
            CardRecord::new("12/25", Balance::new(dec!(1000.00))),
        ),
        (
            AMEX.to_string(),
            CardRecord::new("09/26", Balance::new(dec!(5000.00))),
        ),
        (
            BLOCKED.to_string(),
            CardRecord::new("12/25", Balance::new(dec!(1000.00))),
        ),
    ])
}

/// In-memory network over the seeded ledger with a scorer that never flags.
pub fn network() -> Network {
    network_with(StaticScorer::clean())
}

pub fn network_with(scorer: StaticScorer) -> Network {
    let stores = Stores {
        ledger: Box::new(seeded_ledger()),
        ..Stores::in_memory()
    };
    Network::with_scorer(
        &test_config(),
        stores,
        CipherService::ephemeral().unwrap(),
        Box::new(scorer),
    )
}

pub fn start_processor(network: &Network) -> JoinHandle<()> {
    network
        .processor
        .clone()
        .spawn(test_config().channel.poll_interval())
}

pub fn amount(value: Decimal) -> Amount {
    Amount::new(value).unwrap()
}

/// Writes a ledger file with the seeded cards and a config with no random flags.
pub fn write_fixtures(dir: &Path) -> std::path::PathBuf {
    let ledger = serde_json::json!({
        VISA: {"expiry": "12/25", "balance": "1000.00", "cardholder": "Jane Doe", "type": "VISA"},
        BLOCKED: {"expiry": "12/25", "balance": "1000.00"},
    });
    std::fs::write(
        dir.join("ledger.json"),
        serde_json::to_string_pretty(&ledger).unwrap(),
    )
    .unwrap();

    let config_path = dir.join("config.json");
    std::fs::write(
        &config_path,
        serde_json::to_string_pretty(&test_config()).unwrap(),
    )
    .unwrap();
    config_path
}
