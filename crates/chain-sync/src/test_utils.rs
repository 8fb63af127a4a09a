//! Deterministic chain fixtures for tests.
//!
//! A [`ChainFixture`] produces a validly signed chain by playing each block
//! against its own store, exactly as a receiving node would. Forks replay
//! the shared prefix and then diverge.

use crate::adapters::{
    CachedSystemParameters, InMemoryKVStore, InMemoryTransactionPool, MockPeerNetwork,
    NoopReputation, RegistryEngine, RegistryTx,
};
use crate::application::{apply_block, SyncDependencies};
use crate::config::SyncConfig;
use crate::domain::{
    codec, Block, BlockHeader, BlockId, Host, InfoBlock, ProducerSet, Registry, RollbackLedger,
};
use crate::ports::ExecutionEngine;
use crate::storage::{chain, StoreTransaction};
use shared_crypto::{Ed25519KeyPair, ZERO_HASH};
use std::sync::Arc;

/// Base timestamp of fixture blocks.
pub const BASE_TIME: i64 = 1_700_000_000;

/// How blocks produced after a fork differ from the shared history.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Divergence {
    /// Same transactions, later timestamps: only the content hash differs.
    Time,
    /// Different keys touched: the rollbacks hash differs too.
    State,
}

#[derive(Clone)]
struct Recipe {
    transactions: Vec<Vec<u8>>,
    time: i64,
}

/// Generates signed chains.
pub struct ChainFixture {
    keys: Vec<Ed25519KeyPair>,
    store: Arc<InMemoryKVStore>,
    engine: RegistryEngine,
    recipes: Vec<Recipe>,
    headers: Vec<BlockHeader>,
    raw: Vec<Vec<u8>>,
    fork: Option<Divergence>,
    generation: i64,
}

/// Fixture key for producer `position`.
pub fn producer_key(position: usize) -> Ed25519KeyPair {
    Ed25519KeyPair::from_seed([position as u8 + 1; 32])
}

/// Registry touched by fixture transactions.
pub fn fixture_registry() -> Registry {
    Registry::new("keys", 1)
}

impl ChainFixture {
    /// Empty chain with `producers` producer keys.
    pub fn new(producers: usize) -> Self {
        Self {
            keys: (0..producers.max(1)).map(producer_key).collect(),
            store: Arc::new(InMemoryKVStore::new()),
            engine: RegistryEngine::new(),
            recipes: Vec::new(),
            headers: Vec::new(),
            raw: Vec::new(),
            fork: None,
            generation: 0,
        }
    }

    /// Append `count` blocks with default transactions.
    pub fn with_blocks(mut self, count: usize) -> Self {
        self.extend(count);
        self
    }

    /// Append `count` blocks with default transactions.
    pub fn extend(&mut self, count: usize) {
        for _ in 0..count {
            let id = self.tip() + 1;
            let transactions = vec![self.default_tx(id)];
            self.extend_with(transactions, 0);
        }
    }

    /// Append one block carrying `transactions`.
    pub fn extend_with(&mut self, transactions: Vec<Vec<u8>>, time_offset: i64) {
        let id = self.tip() + 1;
        let time = BASE_TIME + id * 10 + self.generation + time_offset;
        let recipe = Recipe { transactions, time };
        self.produce(&recipe);
        self.recipes.push(recipe);
    }

    /// Chain sharing blocks below `height` whose later blocks differ only in
    /// their timestamps.
    pub fn fork_at(&self, height: BlockId) -> Self {
        self.branch(height, Divergence::Time)
    }

    /// Chain sharing blocks below `height` whose later blocks touch other keys.
    pub fn diverge_at(&self, height: BlockId) -> Self {
        self.branch(height, Divergence::State)
    }

    fn branch(&self, height: BlockId, divergence: Divergence) -> Self {
        let mut fork = Self::new(self.keys.len());
        for recipe in self.recipes.iter().take((height - 1).max(0) as usize) {
            fork.produce(recipe);
            fork.recipes.push(recipe.clone());
        }
        fork.fork = Some(divergence);
        fork.generation = self.generation + 1;
        fork
    }

    /// Overwrite the rollbacks hash of block `block_id` without re-signing.
    pub fn corrupt_rollbacks_hash(&mut self, block_id: BlockId) {
        let idx = (block_id - 1) as usize;
        let Ok(mut block) = codec::decode(&self.raw[idx]) else {
            return;
        };
        block.header.rollbacks_hash = [0xEE; 32];
        if let Ok(raw) = codec::encode(&block) {
            self.raw[idx] = raw;
        }
    }

    /// Replace the raw bytes of block `block_id`.
    pub fn replace_raw(&mut self, block_id: BlockId, raw: Vec<u8>) {
        self.raw[(block_id - 1) as usize] = raw;
    }

    /// Wire bytes of every block, block 1 first.
    pub fn raw_blocks(&self) -> &[Vec<u8>] {
        &self.raw
    }

    /// Validated header of block `block_id`.
    pub fn header(&self, block_id: BlockId) -> BlockHeader {
        self.headers[(block_id - 1) as usize].clone()
    }

    /// Producer key set matching the fixture.
    pub fn producers(&self) -> ProducerSet {
        ProducerSet::new(self.keys.iter().map(|k| k.public_key()).collect())
    }

    /// Fixture tip.
    pub fn tip(&self) -> BlockId {
        self.headers.len() as BlockId
    }

    /// Fixture state (registry, rollback and chain keys).
    pub fn store(&self) -> &InMemoryKVStore {
        &self.store
    }

    /// Apply blocks `1..=up_to` to `store` and commit.
    pub fn install(&self, store: Arc<InMemoryKVStore>, up_to: BlockId) {
        let engine = RegistryEngine::new();
        let producers = self.producers();
        let mut txn = StoreTransaction::begin(store);
        let mut prev = None;
        for raw in self.raw.iter().take(up_to as usize) {
            let mut block = codec::decode(raw).expect("fixture block decodes");
            block.prev_header = prev.take();
            apply_block(&mut txn, &mut block, raw.clone(), &engine, &producers)
                .expect("fixture block applies");
            prev = Some(block.header);
        }
        txn.commit().expect("fixture commit");
    }

    fn default_tx(&self, id: BlockId) -> Vec<u8> {
        let tx = match self.fork {
            Some(Divergence::State) => RegistryTx::set(
                fixture_registry(),
                format!("f{}", id % 3),
                format!("fork-{}-{}", self.generation, id),
            ),
            _ => RegistryTx::set(fixture_registry(), format!("k{}", id % 3), format!("v{}", id)),
        };
        tx.encode().expect("fixture tx encodes")
    }

    fn produce(&mut self, recipe: &Recipe) {
        let id = self.tip() + 1;
        let prev = self.headers.last().cloned();
        let position = (id as usize) % self.keys.len();
        let (prev_hash, prev_rollbacks_hash) = prev
            .as_ref()
            .map(|p| (p.hash, p.rollbacks_hash))
            .unwrap_or((ZERO_HASH, ZERO_HASH));

        let header = BlockHeader {
            block_id: id,
            time: recipe.time,
            ecosystem_id: 1,
            key_id: vec![position as u8],
            node_position: position as i64,
            ..Default::default()
        };
        let mut block = Block::new(
            header,
            prev_hash,
            prev_rollbacks_hash,
            recipe.transactions.clone(),
        );
        block.prev_header = prev;

        let payload = block.header.for_sign(&block.parent(), &block.merkle_root);
        block.header.signature = self.keys[position].sign(payload.as_bytes()).as_bytes().to_vec();

        // Dry run to learn the rollbacks digest the block will produce.
        let mut dry = StoreTransaction::begin(self.store.clone());
        {
            let mut ledger = RollbackLedger::new(&mut dry);
            self.engine
                .play(&block, &mut ledger)
                .expect("fixture block plays");
            block.header.rollbacks_hash = ledger.block_digest(id).expect("fixture digest");
        }
        dry.rollback();

        let raw_unhashed = codec::encode(&block).expect("fixture block encodes");
        let mut txn = StoreTransaction::begin(self.store.clone());
        apply_block(&mut txn, &mut block, raw_unhashed, &self.engine, &self.producers())
            .expect("fixture block applies");
        txn.commit().expect("fixture commit");

        self.raw.push(codec::encode(&block).expect("fixture block encodes"));
        self.headers.push(block.header);
    }
}

/// Node wired to in-memory collaborators and a mock peer network.
pub struct TestNode {
    /// Node storage.
    pub store: Arc<InMemoryKVStore>,
    /// Simulated peers.
    pub network: Arc<MockPeerNetwork>,
    /// Pending transactions.
    pub tx_pool: Arc<InMemoryTransactionPool>,
    /// Cached system parameters.
    pub system_parameters: Arc<CachedSystemParameters>,
    /// Wiring handed to the sync components.
    pub deps: SyncDependencies,
    /// Sync settings.
    pub config: SyncConfig,
    /// Default peer address.
    pub peer: Host,
}

impl TestNode {
    /// Empty node trusting `fixture`'s producers.
    pub fn new(fixture: &ChainFixture) -> Self {
        let store = Arc::new(InMemoryKVStore::new());
        let config = SyncConfig::for_testing();
        let network = Arc::new(MockPeerNetwork::new(config.blocks_per_request));
        let tx_pool = Arc::new(InMemoryTransactionPool::new());
        let system_parameters = Arc::new(CachedSystemParameters::new());
        let peer = Host::new("peer-a:7078");

        let deps = SyncDependencies {
            store: store.clone(),
            peers: network.clone(),
            engine: Arc::new(RegistryEngine::new()),
            producers: Arc::new(fixture.producers()),
            reputation: Arc::new(NoopReputation),
            tx_pool: tx_pool.clone(),
            system_parameters: system_parameters.clone(),
            bootstrap: None,
        };

        Self {
            store,
            network,
            tx_pool,
            system_parameters,
            deps,
            config: SyncConfig {
                remote_peers: vec![peer.clone()],
                ..config
            },
            peer,
        }
    }

    /// Node holding `fixture`'s blocks `1..=up_to`.
    pub fn with_chain(fixture: &ChainFixture, up_to: BlockId) -> Self {
        let node = Self::new(fixture);
        fixture.install(node.store.clone(), up_to);
        node
    }

    /// Make the default peer serve `fixture`'s chain.
    pub fn serve(&self, fixture: &ChainFixture) {
        self.network.add_peer(&self.peer, fixture.raw_blocks().to_vec());
    }

    /// Committed tip.
    pub fn tip(&self) -> InfoBlock {
        chain::committed_info(self.store.as_ref()).expect("tip readable")
    }
}
