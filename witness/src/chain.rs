//! Fork schedules of the supported chains.

use std::collections::BTreeMap;

use ethereum_types::U256;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("unsupported chain {0}")]
    UnsupportedChain(u64),
}

/// Chain identity and fork activation schedule, named like the `config`
/// object of a genesis file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    pub chain_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homestead_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dao_fork_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eip150_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eip155_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eip158_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byzantium_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constantinople_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub petersburg_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub istanbul_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muir_glacier_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub berlin_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub london_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrow_glacier_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gray_glacier_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_netsplit_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_total_difficulty: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shanghai_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancun_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prague_time: Option<u64>,
}

fn active(fork: Option<u64>, at: u64) -> bool {
    fork.is_some_and(|fork| fork <= at)
}

impl ChainConfig {
    pub fn is_byzantium(&self, number: u64) -> bool {
        active(self.byzantium_block, number)
    }

    pub fn is_constantinople(&self, number: u64) -> bool {
        active(self.constantinople_block, number)
    }

    pub fn is_london(&self, number: u64) -> bool {
        active(self.london_block, number)
    }

    pub fn is_shanghai(&self, timestamp: u64) -> bool {
        active(self.shanghai_time, timestamp)
    }

    pub fn is_cancun(&self, timestamp: u64) -> bool {
        active(self.cancun_time, timestamp)
    }

    pub fn is_prague(&self, timestamp: u64) -> bool {
        active(self.prague_time, timestamp)
    }

    /// Base block reward in wei before the merge.
    pub fn block_reward(&self, number: u64) -> U256 {
        let eth = U256::exp10(18);
        if self.is_constantinople(number) {
            eth * 2
        } else if self.is_byzantium(number) {
            eth * 3
        } else {
            eth * 5
        }
    }

    pub fn mainnet() -> Self {
        Self {
            chain_id: 1,
            homestead_block: Some(1_150_000),
            dao_fork_block: Some(1_920_000),
            eip150_block: Some(2_463_000),
            eip155_block: Some(2_675_000),
            eip158_block: Some(2_675_000),
            byzantium_block: Some(4_370_000),
            constantinople_block: Some(7_280_000),
            petersburg_block: Some(7_280_000),
            istanbul_block: Some(9_069_000),
            muir_glacier_block: Some(9_200_000),
            berlin_block: Some(12_244_000),
            london_block: Some(12_965_000),
            arrow_glacier_block: Some(13_773_000),
            gray_glacier_block: Some(15_050_000),
            merge_netsplit_block: None,
            terminal_total_difficulty: Some(U256::from(58_750u64) * U256::exp10(18)),
            shanghai_time: Some(1_681_338_455),
            cancun_time: Some(1_710_338_135),
            prague_time: Some(1_746_612_311),
        }
    }

    pub fn sepolia() -> Self {
        Self {
            chain_id: 11_155_111,
            merge_netsplit_block: Some(1_735_371),
            terminal_total_difficulty: Some(U256::from(17_000_000_000_000_000u64)),
            shanghai_time: Some(1_677_557_088),
            cancun_time: Some(1_706_655_072),
            prague_time: Some(1_741_159_776),
            ..Self::genesis_forks(11_155_111)
        }
    }

    pub fn holesky() -> Self {
        Self {
            chain_id: 17_000,
            terminal_total_difficulty: Some(U256::zero()),
            shanghai_time: Some(1_696_000_704),
            cancun_time: Some(1_707_305_664),
            prague_time: Some(1_740_434_112),
            ..Self::genesis_forks(17_000)
        }
    }

    /// Every block-numbered fork active from genesis.
    fn genesis_forks(chain_id: u64) -> Self {
        Self {
            chain_id,
            homestead_block: Some(0),
            eip150_block: Some(0),
            eip155_block: Some(0),
            eip158_block: Some(0),
            byzantium_block: Some(0),
            constantinople_block: Some(0),
            petersburg_block: Some(0),
            istanbul_block: Some(0),
            muir_glacier_block: Some(0),
            berlin_block: Some(0),
            london_block: Some(0),
            ..Default::default()
        }
    }
}

/// Chain configurations known to the process, built once at startup and
/// handed to whoever needs to resolve a chain id.
#[derive(Clone, Debug)]
pub struct ChainRegistry {
    configs: BTreeMap<u64, ChainConfig>,
}

impl ChainRegistry {
    pub fn new(configs: impl IntoIterator<Item = ChainConfig>) -> Self {
        Self {
            configs: configs.into_iter().map(|c| (c.chain_id, c)).collect(),
        }
    }

    /// Mainnet, Sepolia and Holesky.
    pub fn builtin() -> Self {
        Self::new([
            ChainConfig::mainnet(),
            ChainConfig::sepolia(),
            ChainConfig::holesky(),
        ])
    }

    pub fn get(&self, chain_id: u64) -> Result<&ChainConfig, ChainError> {
        self.configs
            .get(&chain_id)
            .ok_or(ChainError::UnsupportedChain(chain_id))
    }

    pub fn chain_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.configs.keys().copied()
    }
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
