//! The chain itself: best-chain selection, block connection, undo-driven
//! disconnection, and reorganisation.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::convert::TryFrom;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use bch_chain::amount::{Amount, NonNegative};
use bch_chain::block::{self, Block, Height};
use bch_chain::parameters::{genesis_block, Network, NetworkUpgrade};
use bch_chain::serialization::{CashDeserialize, CashSerialize};
use bch_chain::transparent::OutPoint;
use bch_chain::work::difficulty::CompactDifficulty;
use bch_consensus::block::{
    block_subsidy, check_block, check_coinbase_height, check_proof_of_work,
    check_transaction_order,
};
use bch_consensus::parameters::max_block_sigops;
use bch_consensus::transaction::{check_inputs, transaction_sigops, InputError};
use bch_consensus::{
    BlockError, BoxError, CoinView, InputCheck, ScriptVerifier, SequentialVerifier,
    TransactionError, UtxoEntry, UtxoReader, VerifyError,
};
use bch_script::VerifyFlags;

use crate::difficulty::{self, EntryProvider};
use crate::entry::ChainEntry;
use crate::error::ChainError;
use crate::store::{layout, Batch, Store, StoreError};
use crate::undo::BlockUndo;
use crate::versionbits::{self, Deployment, ThresholdState};

/// Receives chain lifecycle events.
///
/// Delivery is synchronous with respect to state transitions: `connect`
/// events for successive tips arrive in strict height order, and a
/// reorganisation delivers every `disconnect` (in reverse height order)
/// before the first `connect` of the new branch. Listeners must not
/// re-enter the chain.
pub trait ChainListener: Send + Sync {
    fn connect(&self, _entry: &ChainEntry, _block: &Block, _view: &CoinView<'_>) {}
    fn disconnect(&self, _entry: &ChainEntry, _block: &Block, _view: &CoinView<'_>) {}
    fn tip(&self, _entry: &ChainEntry) {}
    fn reset(&self, _entry: &ChainEntry) {}
}

/// Adapts the store's `c` namespace to the consensus [`UtxoReader`].
struct StoreUtxos<'a, S: Store> {
    store: &'a S,
}

impl<'a, S: Store> UtxoReader for StoreUtxos<'a, S> {
    fn utxo(&self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>, BoxError> {
        match self.store.get(&layout::utxo(outpoint)) {
            Ok(Some(bytes)) => Ok(Some(
                UtxoEntry::cash_deserialize(&bytes[..]).map_err(|e| Box::new(e) as BoxError)?,
            )),
            Ok(None) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }
}

/// A borrowed view of the entry table, so entry walks can run while other
/// chain fields are mutably borrowed.
struct Entries<'a> {
    entries: &'a HashMap<block::Hash, Arc<ChainEntry>>,
}

impl EntryProvider for Entries<'_> {
    fn entry(&self, hash: &block::Hash) -> Option<Arc<ChainEntry>> {
        self.entries.get(hash).cloned()
    }
}

/// The chain state machine.
///
/// All mutating operations take `&mut self`; [`Chain`] wraps this in the
/// single chain lock so readers can share snapshots while writers are
/// exclusive.
pub struct ChainState<S: Store> {
    network: Network,
    store: S,
    entries: HashMap<block::Hash, Arc<ChainEntry>>,
    /// Height-indexed view of the best chain.
    main: BTreeMap<u32, block::Hash>,
    tip: Arc<ChainEntry>,
    invalid: HashSet<block::Hash>,
    listeners: Vec<Box<dyn ChainListener>>,
    verifier: Box<dyn ScriptVerifier>,
    vbits: HashMap<(u8, block::Hash), ThresholdState>,
    vbits_persisted: HashSet<(u8, block::Hash)>,
    fatal: bool,
}

impl<S: Store> EntryProvider for ChainState<S> {
    fn entry(&self, hash: &block::Hash) -> Option<Arc<ChainEntry>> {
        self.entries.get(hash).cloned()
    }
}

impl<S: Store> ChainState<S> {
    /// Open a chain over `store`, creating and committing the genesis block
    /// on first use.
    pub fn open(store: S, network: Network) -> Result<ChainState<S>, ChainError> {
        match store.get(layout::VERSION)? {
            Some(bytes) if bytes == layout::SCHEMA_VERSION.to_be_bytes() => {}
            Some(_) => return Err(StoreError::Corrupt("schema version mismatch").into()),
            None => return Self::initialize(store, network),
        }

        match store.get(layout::OPTIONS)? {
            Some(bytes) if bytes == [network_byte(network)] => {}
            _ => return Err(StoreError::Corrupt("store belongs to another network").into()),
        }

        let tip_hash = store
            .get(layout::TIP)?
            .ok_or(StoreError::Corrupt("missing tip"))?;
        let tip_hash = block::Hash(
            <[u8; 32]>::try_from(&tip_hash[..])
                .map_err(|_| StoreError::Corrupt("malformed tip hash"))?,
        );

        // Load the best chain into the entry table by walking parents.
        let mut entries = HashMap::new();
        let mut main = BTreeMap::new();
        let mut hash = tip_hash;
        let tip = loop {
            let bytes = store
                .get(&layout::entry(&hash))?
                .ok_or(StoreError::Corrupt("missing entry on best chain"))?;
            let entry = Arc::new(
                ChainEntry::cash_deserialize(&bytes[..])
                    .map_err(|_| StoreError::Corrupt("malformed chain entry"))?,
            );
            main.insert(entry.height.0, entry.hash);
            entries.insert(entry.hash, entry.clone());
            if entry.is_genesis() {
                break entries
                    .get(&tip_hash)
                    .cloned()
                    .expect("tip entry was just inserted");
            }
            hash = entry.prev;
        };

        info!(height = tip.height.0, hash = %tip.hash, "chain opened");
        Ok(ChainState {
            network,
            store,
            entries,
            main,
            tip,
            invalid: HashSet::new(),
            listeners: Vec::new(),
            verifier: Box::new(SequentialVerifier),
            vbits: HashMap::new(),
            vbits_persisted: HashSet::new(),
            fatal: false,
        })
    }

    fn initialize(store: S, network: Network) -> Result<ChainState<S>, ChainError> {
        let genesis = genesis_block(network);
        let entry = Arc::new(ChainEntry::from_header(
            &genesis.header,
            None,
            genesis.header.time,
        ));

        let mut batch = Batch::new();
        batch.put(
            layout::VERSION.to_vec(),
            layout::SCHEMA_VERSION.to_be_bytes().to_vec(),
        );
        batch.put(layout::OPTIONS.to_vec(), vec![network_byte(network)]);
        batch.put(layout::entry(&entry.hash), serialize(&*entry));
        batch.put(
            layout::height(&entry.hash),
            entry.height.0.to_be_bytes().to_vec(),
        );
        batch.put(layout::main_hash(entry.height), entry.hash.0.to_vec());
        batch.put(layout::block(&entry.hash), serialize(&genesis));
        batch.put(layout::TIP.to_vec(), entry.hash.0.to_vec());
        store.write(batch)?;

        info!(network = ?network, hash = %entry.hash, "chain initialized at genesis");

        let mut entries = HashMap::new();
        entries.insert(entry.hash, entry.clone());
        let mut main = BTreeMap::new();
        main.insert(0, entry.hash);

        Ok(ChainState {
            network,
            store,
            entries,
            main,
            tip: entry,
            invalid: HashSet::new(),
            listeners: Vec::new(),
            verifier: Box::new(SequentialVerifier),
            vbits: HashMap::new(),
            vbits_persisted: HashSet::new(),
            fatal: false,
        })
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// The current best tip.
    pub fn tip(&self) -> Arc<ChainEntry> {
        self.tip.clone()
    }

    pub fn height(&self) -> Height {
        self.tip.height
    }

    /// The hash of the best-chain block at `height`, if any.
    pub fn main_hash(&self, height: Height) -> Option<block::Hash> {
        self.main.get(&height.0).copied()
    }

    /// Register a listener for chain events.
    pub fn add_listener(&mut self, listener: Box<dyn ChainListener>) {
        self.listeners.push(listener);
    }

    /// Replace the input verifier, e.g. with a parallel worker pool.
    pub fn set_verifier(&mut self, verifier: Box<dyn ScriptVerifier>) {
        self.verifier = verifier;
    }

    /// Look up a committed UTXO.
    pub fn utxo(&self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>, ChainError> {
        let reader = StoreUtxos { store: &self.store };
        reader
            .utxo(outpoint)
            .map_err(|e| StoreError::Backend(e.to_string()).into())
    }

    /// The target required for a block following the current tip at `time`.
    pub fn next_target(&self, time: DateTime<Utc>) -> CompactDifficulty {
        difficulty::next_target(self, self.network, &self.tip, time)
    }

    /// The script flags for a block following `parent`.
    pub fn script_flags(&self, parent: &ChainEntry) -> VerifyFlags {
        let height = Height(parent.height.0 + 1);
        let mtp = parent.median_time_past;
        let mut flags = VerifyFlags::P2SH | VerifyFlags::STRICTENC | VerifyFlags::DERSIG;
        if NetworkUpgrade::Uahf.is_active(self.network, height, mtp) {
            flags |= VerifyFlags::SIGHASH_FORKID | VerifyFlags::LOW_S | VerifyFlags::NULLFAIL;
        }
        if NetworkUpgrade::MagneticAnomaly.is_active(self.network, height, mtp) {
            flags |= VerifyFlags::CHECKDATASIG
                | VerifyFlags::SIGPUSHONLY
                | VerifyFlags::CLEANSTACK;
        }
        flags
    }

    /// Whether canonical transaction ordering is required for a block
    /// following `parent`.
    pub fn requires_canonical_order(&self, parent: &ChainEntry) -> bool {
        NetworkUpgrade::MagneticAnomaly.is_active(
            self.network,
            Height(parent.height.0 + 1),
            parent.median_time_past,
        )
    }

    /// The BIP 9 state of `deployment` for the next block, persisting any
    /// newly computed window states.
    pub fn deployment_state(
        &mut self,
        deployment: &Deployment,
    ) -> Result<ThresholdState, ChainError> {
        if self.fatal {
            return Err(ChainError::Fatal);
        }
        let tip = self.tip.clone();
        let provider = Entries {
            entries: &self.entries,
        };
        let state = versionbits::threshold_state(
            &provider,
            self.network,
            Some(&tip),
            deployment,
            &mut self.vbits,
        );

        let mut batch = Batch::new();
        for (key, state) in &self.vbits {
            if self.vbits_persisted.contains(key) {
                continue;
            }
            batch.put(
                layout::version_bits(key.0, &key.1),
                vec![state.to_byte()],
            );
        }
        if !batch.is_empty() {
            if let Err(e) = self.store.write(batch) {
                self.fatal = true;
                return Err(e.into());
            }
            self.vbits_persisted = self.vbits.keys().cloned().collect();
        }
        Ok(state)
    }

    /// The version a newly assembled block should carry.
    pub fn compute_block_version(&mut self) -> i32 {
        let tip = self.tip.clone();
        let provider = Entries {
            entries: &self.entries,
        };
        versionbits::compute_block_version(&provider, self.network, &tip, &mut self.vbits)
    }

    /// Accept a block whose parent is already known.
    ///
    /// Contextual header checks run first; the block then either extends a
    /// branch (stored, no events), extends the best chain (connected), or
    /// out-works the best chain (reorganisation). `now` is the caller's
    /// network-adjusted clock, used only for the future-time bound.
    pub fn accept_block(
        &mut self,
        block: Arc<Block>,
        now: DateTime<Utc>,
    ) -> Result<Arc<ChainEntry>, ChainError> {
        if self.fatal {
            return Err(ChainError::Fatal);
        }
        let hash = block.hash();
        if self.entries.contains_key(&hash) {
            return Err(ChainError::Duplicate(hash));
        }
        if self.invalid.contains(&hash)
            || self.invalid.contains(&block.header.previous_block_hash)
        {
            self.invalid.insert(hash);
            return Err(ChainError::KnownInvalid(hash));
        }
        let parent = self
            .entries
            .get(&block.header.previous_block_hash)
            .cloned()
            .ok_or(ChainError::Orphan(hash))?;

        match self.check_and_place(block, parent, now) {
            Ok(entry) => Ok(entry),
            Err(err) => {
                if let ChainError::Store(_) = err {
                    self.fatal = true;
                } else if let ChainError::Verify(ref verify) = err {
                    debug!(%hash, reason = verify.reason(), score = verify.ban_score(),
                           "block rejected");
                    self.invalid.insert(hash);
                    self.entries.remove(&hash);
                }
                Err(err)
            }
        }
    }

    fn check_and_place(
        &mut self,
        block: Arc<Block>,
        parent: Arc<ChainEntry>,
        now: DateTime<Utc>,
    ) -> Result<Arc<ChainEntry>, ChainError> {
        // Contextual header checks.
        check_proof_of_work(&block.header).map_err(VerifyError::from)?;
        let expected =
            difficulty::next_target(self, self.network, &parent, block.header.time);
        if block.header.bits != expected {
            return Err(VerifyError::from(BlockError::BadDiffBits).into());
        }
        if block.header.time <= parent.median_time_past {
            return Err(VerifyError::from(BlockError::TimeTooOld).into());
        }
        block
            .header
            .time_is_valid_at(now)
            .map_err(|_| VerifyError::from(BlockError::TimeTooNew))?;

        // Context-free body checks.
        check_block(&block).map_err(VerifyError::from)?;

        let median_time_past = self.median_time_for(&block.header, &parent);
        let entry = Arc::new(ChainEntry::from_header(
            &block.header,
            Some(&parent),
            median_time_past,
        ));
        self.entries.insert(entry.hash, entry.clone());

        if entry.chainwork <= self.tip.chainwork {
            // A branch block: store it for a possible future reorg. The
            // first-received chain wins ties by never being displaced here.
            let mut batch = Batch::new();
            batch.put(layout::entry(&entry.hash), serialize(&*entry));
            batch.put(
                layout::height(&entry.hash),
                entry.height.0.to_be_bytes().to_vec(),
            );
            batch.put(layout::block(&entry.hash), serialize(&*block));
            batch.put(layout::branch_tip(&entry.hash), vec![1]);
            batch.delete(layout::branch_tip(&entry.prev));
            self.store.write(batch)?;
            debug!(hash = %entry.hash, height = entry.height.0, "stored branch block");
            return Ok(entry);
        }

        if parent.hash == self.tip.hash {
            self.connect_block(&entry, &block)?;
        } else {
            self.reorganize(&entry, &block)?;
        }
        Ok(entry)
    }

    /// The median-time-past for a new block: the median of its own time and
    /// its ten ancestors' times.
    fn median_time_for(&self, header: &block::Header, parent: &ChainEntry) -> DateTime<Utc> {
        let mut times = vec![header.time];
        let mut current = Some(std::sync::Arc::new(parent.clone()));
        while let Some(entry) = current {
            times.push(entry.time);
            if times.len() == 11 || entry.is_genesis() {
                break;
            }
            current = self.entries.get(&entry.prev).cloned();
        }
        times.sort();
        times[times.len() / 2]
    }

    /// Run the full contextual body pipeline for a block extending
    /// `parent`, accumulating spends into `view`.
    ///
    /// Returns the undo record, the script jobs, and the total fees. This
    /// is the shared path between connection and the miner's preverify.
    fn check_block_body<'v>(
        &self,
        parent: &ChainEntry,
        entry_height: Height,
        block: &Block,
        view: &mut CoinView<'v>,
    ) -> Result<(BlockUndo, Vec<InputCheck>, Amount<NonNegative>), ChainError> {
        let flags = self.script_flags(parent);
        let canonical = self.requires_canonical_order(parent);

        if canonical {
            check_transaction_order(block).map_err(VerifyError::from)?;
        }
        if entry_height >= self.network.bip34_height() && entry_height.0 > 0 {
            check_coinbase_height(block, entry_height).map_err(VerifyError::from)?;
        }

        let mut undo = BlockUndo::default();
        let mut checks = Vec::new();
        let mut fees = Amount::<NonNegative>::zero();
        let mut sigops = 0usize;

        // Under canonical ordering a transaction may precede the one it
        // spends, so validation adds every output before resolving any
        // input. Before activation, blocks are topologically ordered and
        // outputs become visible one transaction at a time.
        if canonical {
            for tx in block.transactions.iter() {
                view.apply_transaction(tx, entry_height);
            }
        } else {
            view.apply_transaction(&block.transactions[0], entry_height);
        }

        for (index, tx) in block.transactions.iter().enumerate() {
            sigops += transaction_sigops(tx, view, flags).map_err(input_error)?;

            if index == 0 {
                continue;
            }

            if !tx.is_final(entry_height, parent.median_time_past) {
                return Err(VerifyError::from(TransactionError::NonFinal).into());
            }

            // Resolve every spent coin up front: the same entries feed the
            // script jobs and the undo record, in input order.
            for (input_index, input) in tx.inputs.iter().enumerate() {
                let outpoint = input
                    .outpoint()
                    .ok_or_else(|| VerifyError::from(TransactionError::NullPrevOut))?;
                let coin = view
                    .get(&outpoint)
                    .map_err(store_error)?
                    .ok_or_else(|| {
                        VerifyError::from(TransactionError::MissingOrSpentInput(outpoint))
                    })?;
                undo.spent.push(coin.clone());
                checks.push(InputCheck {
                    tx: block.transactions[index].clone(),
                    index: input_index,
                    coin,
                    flags,
                });
            }

            let fee = check_inputs(tx, view, entry_height).map_err(input_error)?;
            fees = (fee + fees).map_err(|_| VerifyError::from(TransactionError::FeeOutOfRange))?;
            if !canonical {
                view.apply_transaction(tx, entry_height);
            }
        }

        if sigops > max_block_sigops(block.serialized_size()) {
            return Err(VerifyError::from(BlockError::TooManySigops).into());
        }

        // The coinbase may claim at most subsidy plus fees.
        let subsidy = block_subsidy(entry_height, self.network.halving_interval());
        let claimable = (subsidy + fees)
            .map_err(|_| VerifyError::from(BlockError::BadCoinbaseAmount))?;
        let mut claimed = Amount::<NonNegative>::zero();
        for output in &block.transactions[0].outputs {
            claimed = (claimed + output.value)
                .map_err(|_| VerifyError::from(BlockError::BadCoinbaseAmount))?;
        }
        if claimed > claimable {
            return Err(VerifyError::from(BlockError::BadCoinbaseAmount).into());
        }

        Ok((undo, checks, fees))
    }

    /// Verify a block against the current tip without touching any state.
    ///
    /// The miner runs assembled templates through this before handing them
    /// to hashing hardware; an assembler bug must abort here, never produce
    /// an invalid block.
    pub fn preverify_block(&self, block: &Block) -> Result<(), ChainError> {
        if block.header.previous_block_hash != self.tip.hash {
            return Err(ChainError::Orphan(block.hash()));
        }
        check_block(block).map_err(VerifyError::from)?;

        let parent = self.tip.clone();
        let height = Height(parent.height.0 + 1);
        let reader = StoreUtxos { store: &self.store };
        let mut view = CoinView::new(&reader);
        let (_undo, checks, _fees) = self.check_block_body(&parent, height, block, &mut view)?;
        self.verifier
            .verify_inputs(&checks)
            .map_err(VerifyError::from)?;
        Ok(())
    }

    /// Connect a block extending the current tip.
    fn connect_block(&mut self, entry: &Arc<ChainEntry>, block: &Arc<Block>) -> Result<(), ChainError> {
        let parent = self
            .entries
            .get(&entry.prev)
            .cloned()
            .ok_or(StoreError::Corrupt("connecting block with unknown parent"))?;

        let reader = StoreUtxos { store: &self.store };
        let mut view = CoinView::new(&reader);
        let (undo, checks, fees) =
            self.check_block_body(&parent, entry.height, block, &mut view)?;

        self.verifier
            .verify_inputs(&checks)
            .map_err(VerifyError::from)?;

        // Commit: UTXO changes, undo data, entry and index records, tip.
        let mut batch = Batch::new();
        for (outpoint, change) in view.changes() {
            match change {
                Some(utxo) => batch.put(layout::utxo(&outpoint), serialize(&utxo)),
                None => batch.delete(layout::utxo(&outpoint)),
            }
        }
        batch.put(layout::undo(&entry.hash), serialize(&undo));
        batch.put(layout::entry(&entry.hash), serialize(&**entry));
        batch.put(
            layout::height(&entry.hash),
            entry.height.0.to_be_bytes().to_vec(),
        );
        batch.put(layout::main_hash(entry.height), entry.hash.0.to_vec());
        batch.put(layout::next(&entry.prev), entry.hash.0.to_vec());
        batch.put(layout::block(&entry.hash), serialize(&**block));
        batch.put(layout::branch_tip(&entry.hash), vec![1]);
        batch.delete(layout::branch_tip(&entry.prev));
        batch.put(layout::TIP.to_vec(), entry.hash.0.to_vec());
        self.store.write(batch)?;

        self.main.insert(entry.height.0, entry.hash);
        self.tip = entry.clone();

        metrics::counter!("chain.connected.blocks").increment(1);
        metrics::gauge!("chain.tip.height").set(entry.height.0 as f64);
        info!(height = entry.height.0, hash = %entry.hash,
              fees = fees.value(), txs = block.transactions.len(), "connected block");

        for listener in &self.listeners {
            listener.connect(entry, block, &view);
        }
        for listener in &self.listeners {
            listener.tip(entry);
        }
        Ok(())
    }

    /// Disconnect the current tip, restoring the UTXO set from its undo
    /// record.
    pub fn disconnect_tip(&mut self) -> Result<(Arc<ChainEntry>, Arc<Block>), ChainError> {
        if self.fatal {
            return Err(ChainError::Fatal);
        }
        let entry = self.tip.clone();
        if entry.is_genesis() {
            return Err(StoreError::Corrupt("cannot disconnect the genesis block").into());
        }
        let parent = self
            .entries
            .get(&entry.prev)
            .cloned()
            .ok_or(StoreError::Corrupt("tip parent missing from entry table"))?;

        let block = self.read_block(&entry.hash)?;
        let undo_bytes = self
            .store
            .get(&layout::undo(&entry.hash))?
            .ok_or(StoreError::Corrupt("missing undo data for tip"))?;
        let undo = BlockUndo::cash_deserialize(&undo_bytes[..])
            .map_err(|_| StoreError::Corrupt("malformed undo data"))?;

        let reader = StoreUtxos { store: &self.store };
        let mut view = CoinView::new(&reader);

        // Restore the coins the block spent, in input order...
        let mut spent = undo.spent.iter();
        for tx in block.transactions.iter().skip(1) {
            for input in &tx.inputs {
                let outpoint = input
                    .outpoint()
                    .ok_or(StoreError::Corrupt("null prevout in connected block"))?;
                let coin = spent
                    .next()
                    .ok_or(StoreError::Corrupt("undo data shorter than inputs"))?;
                view.add(outpoint, coin.clone());
            }
        }
        // ...then remove every output it created. The order matters for
        // intra-block spends: a restored coin created by this same block
        // must end up deleted, not resurrected.
        for tx in &block.transactions {
            let hash = tx.hash();
            for index in 0..tx.outputs.len() {
                view.spend(&OutPoint {
                    hash,
                    index: index as u32,
                })
                .map_err(store_error)?;
            }
        }

        let mut batch = Batch::new();
        for (outpoint, change) in view.changes() {
            match change {
                Some(utxo) => batch.put(layout::utxo(&outpoint), serialize(&utxo)),
                None => batch.delete(layout::utxo(&outpoint)),
            }
        }
        batch.delete(layout::undo(&entry.hash));
        batch.delete(layout::next(&entry.prev));
        batch.delete(layout::main_hash(entry.height));
        batch.put(layout::branch_tip(&entry.hash), vec![1]);
        batch.put(layout::TIP.to_vec(), parent.hash.0.to_vec());
        if let Err(e) = self.store.write(batch) {
            self.fatal = true;
            return Err(e.into());
        }

        self.main.remove(&entry.height.0);
        self.tip = parent.clone();

        metrics::counter!("chain.disconnected.blocks").increment(1);
        metrics::gauge!("chain.tip.height").set(parent.height.0 as f64);
        info!(height = entry.height.0, hash = %entry.hash, "disconnected block");

        for listener in &self.listeners {
            listener.disconnect(&entry, &block, &view);
        }
        for listener in &self.listeners {
            listener.tip(&parent);
        }
        Ok((entry, block))
    }

    /// Rewind the best chain to `height`, disconnecting every block above
    /// it, and notify listeners that history restarts there.
    pub fn reset(&mut self, height: Height) -> Result<Arc<ChainEntry>, ChainError> {
        if self.fatal {
            return Err(ChainError::Fatal);
        }
        while self.tip.height > height {
            self.disconnect_tip()?;
        }
        let tip = self.tip.clone();
        for listener in &self.listeners {
            listener.reset(&tip);
        }
        info!(height = tip.height.0, hash = %tip.hash, "chain reset");
        Ok(tip)
    }

    /// Switch the best chain to the branch ending in `new_tip`.
    ///
    /// Disconnects back to the fork point, then connects forward. If any
    /// forward connect fails, the original chain is restored and the
    /// offending entry marked invalid.
    fn reorganize(
        &mut self,
        new_tip: &Arc<ChainEntry>,
        new_block: &Arc<Block>,
    ) -> Result<(), ChainError> {
        let fork = self.find_fork(new_tip)?;
        warn!(old_tip = %self.tip.hash, new_tip = %new_tip.hash, fork = %fork.hash,
              "reorganizing chain");

        let mut disconnected = Vec::new();
        while self.tip.hash != fork.hash {
            disconnected.push(self.disconnect_tip()?);
        }

        // The branch from the fork (exclusive) to the new tip, oldest
        // first.
        let mut path = Vec::new();
        let mut current = new_tip.clone();
        while current.hash != fork.hash {
            path.push(current.clone());
            current = self
                .entries
                .get(&current.prev)
                .cloned()
                .ok_or(StoreError::Corrupt("branch entry missing during reorg"))?;
        }
        path.reverse();

        for entry in path {
            let branch_block = if entry.hash == new_tip.hash {
                new_block.clone()
            } else {
                self.read_block(&entry.hash)?
            };
            if let Err(err) = self.connect_block(&entry, &branch_block) {
                if let ChainError::Store(_) = err {
                    self.fatal = true;
                    return Err(err);
                }
                warn!(hash = %entry.hash, "reorg branch is invalid; rolling back");
                self.invalid.insert(entry.hash);
                self.entries.remove(&entry.hash);

                while self.tip.hash != fork.hash {
                    self.disconnect_tip()?;
                }
                for (old_entry, old_block) in disconnected.iter().rev() {
                    self.connect_block(old_entry, old_block)?;
                }
                return Err(err);
            }
        }

        metrics::counter!("chain.reorganizations").increment(1);
        Ok(())
    }

    /// The most recent common ancestor of `entry` and the best chain.
    fn find_fork(&self, entry: &Arc<ChainEntry>) -> Result<Arc<ChainEntry>, ChainError> {
        let mut current = entry.clone();
        loop {
            if self.main.get(&current.height.0) == Some(&current.hash) {
                return Ok(current);
            }
            current = self
                .entries
                .get(&current.prev)
                .cloned()
                .ok_or_else(|| StoreError::Corrupt("fork walk fell off the entry table"))?;
        }
    }

    /// Read a stored block body.
    fn read_block(&self, hash: &block::Hash) -> Result<Arc<Block>, ChainError> {
        let bytes = self
            .store
            .get(&layout::block(hash))?
            .ok_or(StoreError::Corrupt("missing block body"))?;
        let block = Block::cash_deserialize(&bytes[..])
            .map_err(|_| StoreError::Corrupt("malformed stored block"))?;
        Ok(Arc::new(block))
    }
}

fn network_byte(network: Network) -> u8 {
    match network {
        Network::Mainnet => 0,
        Network::Testnet => 1,
        Network::Regtest => 2,
    }
}

fn serialize<T: CashSerialize>(value: &T) -> Vec<u8> {
    value
        .cash_serialize_to_vec()
        .expect("serialization to memory never fails")
}

fn store_error(e: BoxError) -> ChainError {
    ChainError::Store(StoreError::Backend(e.to_string()))
}

fn input_error(e: InputError) -> ChainError {
    match e {
        InputError::Invalid(e) => ChainError::Verify(e.into()),
        InputError::Store(e) => store_error(e),
    }
}

/// The chain behind its single lock.
///
/// Mutating operations (accept, disconnect) take the write half; read-only
/// operations (tip snapshots, target computation) share the read half.
pub struct Chain<S: Store> {
    state: RwLock<ChainState<S>>,
}

impl<S: Store> Chain<S> {
    pub fn open(store: S, network: Network) -> Result<Chain<S>, ChainError> {
        Ok(Chain {
            state: RwLock::new(ChainState::open(store, network)?),
        })
    }

    /// The current best tip.
    pub fn tip(&self) -> Arc<ChainEntry> {
        self.read(|state| state.tip())
    }

    /// Accept a block under the chain lock.
    pub fn accept_block(
        &self,
        block: Arc<Block>,
        now: DateTime<Utc>,
    ) -> Result<Arc<ChainEntry>, ChainError> {
        self.write(|state| state.accept_block(block, now))
    }

    /// Run a read-only closure against the state.
    pub fn read<R>(&self, f: impl FnOnce(&ChainState<S>) -> R) -> R {
        let guard = self
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&guard)
    }

    /// Run a mutating closure under the exclusive half of the lock.
    pub fn write<R>(&self, f: impl FnOnce(&mut ChainState<S>) -> R) -> R {
        let mut guard = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}
