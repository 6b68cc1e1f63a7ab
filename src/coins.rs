//! Coin catalog: display names for the price-feed identifiers the settings
//! form offers.

/// Maximum number of coins a configuration may track.
pub const MAX_COINS: usize = 5;

/// Placeholder used by the settings form and file for an empty coin slot.
pub const UNSET: &str = "---";

/// Shown for identifiers that are not in the catalog.
pub const UNKNOWN_NAME: &str = "Unknown Coin";

/// A selectable coin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Coin {
    pub name: &'static str,
    pub id: &'static str,
}

impl Coin {
    pub const fn new(name: &'static str, id: &'static str) -> Self {
        Self { name, id }
    }
}

pub const CATALOG: &[Coin] = &[
    Coin::new("Bitcoin", "bitcoin"),
    Coin::new("Ethereum", "ethereum"),
    Coin::new("Cardano", "cardano"),
    Coin::new("BNB", "binancecoin"),
    Coin::new("XRP", "ripple"),
    Coin::new("Solana", "solana"),
    Coin::new("Dogecoin", "dogecoin"),
    Coin::new("Tron", "tron"),
    Coin::new("Sui", "sui"),
    Coin::new("Chainlink", "chainlink"),
    Coin::new("Avalanche", "avalanche-2"),
    Coin::new("Monero", "monero"),
    Coin::new("Litecoin", "litecoin"),
    Coin::new("Polkadot", "polkadot"),
    Coin::new("Shiba Inu", "shiba-inu"),
    Coin::new("Cronos", "crypto-com-chain"),
    Coin::new("Toncoin", "the-open-network"),
    Coin::new("Bitcoin Cash", "bitcoin-cash"),
];

pub fn lookup(id: &str) -> Option<&'static Coin> {
    CATALOG.iter().find(|coin| coin.id == id)
}

/// Display name for a coin identifier.
pub fn friendly_name(id: &str) -> &'static str {
    lookup(id).map_or(UNKNOWN_NAME, |coin| coin.name)
}
