//! Dependency-ordered, fee-driven template assembly.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::debug;

use bch_chain::amount::{Amount, NonNegative, COIN};
use bch_chain::block::{self, Height};
use bch_chain::compactint::CompactInt;
use bch_chain::transaction::{LockTime, Transaction};
use bch_chain::transparent::{Address, CoinbaseData, Input, SEQUENCE_FINAL};
use bch_consensus::block::block_subsidy;
use bch_consensus::parameters::max_block_sigops;
use bch_script::standard;
use bch_state::{ChainError, ChainState, Store};

use crate::mempool::MempoolSnapshot;
use crate::template::{BlockTemplate, TemplateEntry};

/// Assembly knobs.
#[derive(Debug, Clone)]
pub struct AssemblerOptions {
    /// The block size budget.
    pub max_size: usize,
    /// Bytes reserved for coin-age-priority transactions; zero disables
    /// the priority phase.
    pub priority_size: usize,
    /// The minimum priority the priority phase will accept.
    pub priority_threshold: f64,
    /// Arbitrary miner data appended to the coinbase after the height
    /// push. At most 20 bytes.
    pub coinbase_flags: Vec<u8>,
    /// The address the coinbase pays.
    pub address: Address,
    /// Zero bytes reserved in the coinbase for the miner's extra nonce.
    pub extra_nonce_size: usize,
}

impl AssemblerOptions {
    pub fn new(address: Address) -> AssemblerOptions {
        AssemblerOptions {
            max_size: 8_000_000,
            priority_size: 0,
            // The classic free-transaction bar: one coin, one day old, in a
            // 250-byte transaction.
            priority_threshold: COIN as f64 * 144.0 / 250.0,
            coinbase_flags: b"/bch-miner/".to_vec(),
            address,
            extra_nonce_size: 8,
        }
    }
}

/// Why a template could not be produced.
#[derive(Error, Debug)]
pub enum AssemblerError {
    #[error("mempool snapshot pinned to {pinned} but the tip is {tip}")]
    StaleSnapshot {
        pinned: block::Hash,
        tip: block::Hash,
    },
    #[error("coinbase flags exceed 20 bytes")]
    OversizeFlags,
    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// The selection key shared by both phases.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    index: usize,
    priority: f64,
    rate: u64,
    desc_rate: u64,
}

/// Priority-phase ordering: coin-age priority, fee rate as tiebreak.
struct ByPriority(Candidate);

impl PartialEq for ByPriority {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for ByPriority {}
impl PartialOrd for ByPriority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for ByPriority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .priority
            .total_cmp(&other.0.priority)
            .then_with(|| self.0.rate.cmp(&other.0.rate))
    }
}

/// Fee-rate-phase ordering: the better of own and descendant rate, with
/// priority as tiebreak.
struct ByRate(Candidate);

impl ByRate {
    fn key(&self) -> u64 {
        self.0.rate.max(self.0.desc_rate)
    }
}

impl PartialEq for ByRate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for ByRate {}
impl PartialOrd for ByRate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for ByRate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key()
            .cmp(&other.key())
            .then_with(|| self.0.priority.total_cmp(&other.0.priority))
    }
}

/// Assemble a template from `snapshot` on top of the current tip.
///
/// The snapshot must be pinned to the tip. `now` becomes the header time,
/// floored to one second past the parent's median-time-past.
pub fn assemble<S: Store>(
    chain: &mut ChainState<S>,
    snapshot: &MempoolSnapshot,
    options: &AssemblerOptions,
    now: DateTime<Utc>,
) -> Result<BlockTemplate, AssemblerError> {
    let tip = chain.tip();
    if snapshot.tip != tip.hash {
        return Err(AssemblerError::StaleSnapshot {
            pinned: snapshot.tip,
            tip: tip.hash,
        });
    }
    if options.coinbase_flags.len() > 20 {
        return Err(AssemblerError::OversizeFlags);
    }

    let height = Height(tip.height.0 + 1);
    let median_time_past = tip.median_time_past;
    let time = std::cmp::max(now, median_time_past + Duration::seconds(1));
    let bits = chain.next_target(time);
    let version = chain.compute_block_version();
    let flags = chain.script_flags(&tip);
    let canonical_order = chain.requires_canonical_order(&tip);
    let max_sigops = max_block_sigops(options.max_size);

    // The coinbase value field is fixed-width, so a zero-fee prototype has
    // the final coinbase size.
    let coinbase_proto = build_coinbase(height, Amount::zero(), options);
    let coinbase_sigops = coinbase_proto
        .outputs
        .iter()
        .map(|output| standard::sig_ops(&output.lock_script.0, false))
        .sum::<usize>();

    let entries = snapshot.entries();

    // In-pool dependency edges.
    let mut blocked: Vec<usize> = Vec::with_capacity(entries.len());
    let mut children: HashMap<usize, Vec<usize>> = HashMap::new();
    for (index, entry) in entries.iter().enumerate() {
        let mut parents = 0;
        for parent in &entry.depends {
            if let Some(parent_index) = snapshot.position(parent) {
                parents += 1;
                children.entry(parent_index).or_default().push(index);
            }
        }
        blocked.push(parents);
    }

    let candidate = |index: usize| {
        let entry = &entries[index];
        Candidate {
            index,
            priority: entry.priority(height),
            rate: entry.rate(),
            desc_rate: entry.desc_rate(),
        }
    };

    let priority_phase = options.priority_size > 0;
    let mut priority_heap: BinaryHeap<ByPriority> = BinaryHeap::new();
    let mut rate_heap: BinaryHeap<ByRate> = BinaryHeap::new();
    for (index, _) in entries.iter().enumerate() {
        if blocked[index] == 0 {
            if priority_phase {
                priority_heap.push(ByPriority(candidate(index)));
            } else {
                rate_heap.push(ByRate(candidate(index)));
            }
        }
    }

    let mut selected: Vec<usize> = Vec::new();
    let mut fees = Amount::<NonNegative>::zero();
    let mut sigops = coinbase_sigops;
    let mut size =
        block::Header::len() + CompactInt::size(entries.len() + 1) + coinbase_proto.serialized_size();

    // Committing an entry releases its in-pool children into whichever
    // heap is currently being drained.
    let mut in_priority_phase = priority_phase;

    macro_rules! commit {
        ($index:expr) => {{
            let index = $index;
            let entry = &entries[index];
            selected.push(index);
            size += entry.size;
            sigops += entry.sigops;
            fees = (fees + entry.fee).unwrap_or(fees);
            if let Some(child_list) = children.get(&index) {
                for &child in child_list {
                    blocked[child] -= 1;
                    if blocked[child] == 0 {
                        if in_priority_phase {
                            priority_heap.push(ByPriority(candidate(child)));
                        } else {
                            rate_heap.push(ByRate(candidate(child)));
                        }
                    }
                }
            }
        }};
    }

    // Priority phase: coin-age ordering until the carve-out fills up or
    // priorities drop below the threshold.
    while in_priority_phase {
        let item = match priority_heap.peek() {
            Some(item) => item,
            None => break,
        };
        if size >= options.priority_size || item.0.priority < options.priority_threshold {
            break;
        }
        let item = priority_heap.pop().expect("peeked item is present");
        let entry = &entries[item.0.index];
        if size + entry.size > options.max_size
            || sigops + entry.sigops > max_sigops
            || !entry.tx.is_final(height, median_time_past)
        {
            continue;
        }
        commit!(item.0.index);
    }
    in_priority_phase = false;
    // Re-seed the remaining candidates under fee-rate ordering.
    for item in priority_heap.drain() {
        rate_heap.push(ByRate(item.0));
    }

    // Fee-rate phase.
    while let Some(item) = rate_heap.pop() {
        let entry = &entries[item.0.index];
        if size + entry.size > options.max_size
            || sigops + entry.sigops > max_sigops
            || !entry.tx.is_final(height, median_time_past)
        {
            // Skipped entries keep their descendants locked out.
            continue;
        }
        commit!(item.0.index);
    }

    // After the canonical-ordering upgrade, non-coinbase transactions sort
    // by id; before it, the topological selection order stands.
    if canonical_order {
        selected.sort_by(|&a, &b| entries[a].hash.txid_cmp(&entries[b].hash));
    }

    let reward = (block_subsidy(height, chain.network().halving_interval()) + fees)
        .expect("subsidy plus in-range fees stays in range");
    let coinbase = Arc::new(build_coinbase(height, reward, options));

    let template_entries: Vec<TemplateEntry> = selected
        .iter()
        .map(|&index| {
            let entry = &entries[index];
            TemplateEntry {
                tx: entry.tx.clone(),
                hash: entry.hash,
                fee: entry.fee,
                size: entry.size,
                sigops: entry.sigops,
            }
        })
        .collect();

    debug!(
        height = height.0,
        txs = template_entries.len(),
        fees = fees.value(),
        size,
        "assembled block template"
    );

    Ok(BlockTemplate {
        height,
        prev_hash: tip.hash,
        version,
        time,
        bits,
        median_time_past,
        flags,
        canonical_order,
        coinbase,
        entries: template_entries,
        fees,
        sigops,
        size,
    })
}

/// Assemble and immediately run the result through the chain's full block
/// pipeline. An assembler bug aborts here instead of producing an invalid
/// block.
pub fn assemble_verified<S: Store>(
    chain: &mut ChainState<S>,
    snapshot: &MempoolSnapshot,
    options: &AssemblerOptions,
    now: DateTime<Utc>,
) -> Result<BlockTemplate, AssemblerError> {
    let template = assemble(chain, snapshot, options, now)?;
    chain.preverify_block(&template.to_block(0))?;
    Ok(template)
}

/// The coinbase: BIP 34 height push, miner flags, reserved extra nonce,
/// and a single output claiming `reward`.
fn build_coinbase(
    height: Height,
    reward: Amount<NonNegative>,
    options: &AssemblerOptions,
) -> Transaction {
    let mut data = Vec::new();
    standard::push_number(&mut data, i64::from(height.0));
    standard::push_data(&mut data, &options.coinbase_flags);
    data.extend(std::iter::repeat(0).take(options.extra_nonce_size));

    Transaction::new(
        1,
        vec![Input::Coinbase {
            data: CoinbaseData::new(data),
            sequence: SEQUENCE_FINAL,
        }],
        vec![bch_chain::transparent::Output {
            value: reward,
            lock_script: options.address.lock_script(),
        }],
        LockTime::unlocked(),
    )
}

#[cfg(test)]
mod tests {
    use std::convert::TryFrom;

    use bch_chain::transaction::Hash as TxHash;
    use bch_chain::transparent::{OutPoint, Output, Script};

    use crate::mempool::MempoolEntry;

    use super::*;

    fn spend(byte: u8, value: i64) -> Arc<Transaction> {
        Arc::new(Transaction::new(
            1,
            vec![Input::PrevOut {
                outpoint: OutPoint {
                    hash: TxHash([byte; 32]),
                    index: 0,
                },
                unlock_script: Script(vec![]),
                sequence: SEQUENCE_FINAL,
            }],
            vec![Output {
                value: Amount::try_from(value).unwrap(),
                lock_script: Script(vec![0x51]),
            }],
            LockTime::unlocked(),
        ))
    }

    /// Drive just the selection phases over fabricated entries by running
    /// the full assembler against a fresh regtest chain.
    fn run_selection(
        entries: Vec<MempoolEntry>,
        options_mut: impl FnOnce(&mut AssemblerOptions),
    ) -> Vec<TxHash> {
        use bch_state::MemoryStore;

        let mut chain =
            ChainState::open(MemoryStore::new(), bch_chain::parameters::Network::Regtest)
                .unwrap();
        let mut snapshot = MempoolSnapshot::new(chain.tip().hash);
        for entry in entries {
            snapshot.insert(entry);
        }

        let address = Address::PayToPublicKeyHash {
            network: bch_chain::parameters::Network::Regtest,
            pub_key_hash: [0x11; 20],
        };
        let mut options = AssemblerOptions::new(address);
        options_mut(&mut options);

        let now = chain.tip().time;
        let template = assemble(&mut chain, &snapshot, &options, now).unwrap();
        template.entries.iter().map(|e| e.hash).collect()
    }

    #[test]
    fn orders_by_effective_fee_rate() {
        bch_test::init();

        // Two independent transactions; the higher rate wins the earlier
        // slot before canonical sorting... which on regtest reorders them,
        // so assert membership instead of position.
        let cheap = MempoolEntry::fake(spend(1, 1_000), 100, 1_000, 1, 0, vec![]);
        let rich = MempoolEntry::fake(spend(2, 1_000), 10_000, 1_000, 1, 0, vec![]);
        let selected = run_selection(vec![cheap.clone(), rich.clone()], |_| {});
        assert_eq!(selected.len(), 2);
        assert!(selected.contains(&cheap.hash));
        assert!(selected.contains(&rich.hash));
    }

    #[test]
    fn parents_unlock_children() {
        bch_test::init();

        let parent = MempoolEntry::fake(spend(1, 1_000), 500, 300, 1, 0, vec![]);
        let child = MempoolEntry::fake(spend(2, 900), 50_000, 300, 1, 0, vec![parent.hash]);
        let orphaned =
            MempoolEntry::fake(spend(3, 900), 50_000, 300, 1, 0, vec![TxHash([0x77; 32])]);

        // The orphan's parent is not in the snapshot, so the orphan is a
        // root; the child only enters once its parent commits.
        let selected = run_selection(vec![parent.clone(), child.clone(), orphaned.clone()], |_| {});
        assert_eq!(selected.len(), 3);
        assert!(selected.contains(&child.hash));
    }

    #[test]
    fn size_budget_excludes_oversize_entries() {
        bch_test::init();

        let small = MempoolEntry::fake(spend(1, 1_000), 1_000, 500, 1, 0, vec![]);
        let huge = MempoolEntry::fake(spend(2, 1_000), 100_000, 9_000_000, 1, 0, vec![]);
        let selected = run_selection(vec![small.clone(), huge.clone()], |_| {});
        assert_eq!(selected, vec![small.hash]);
    }

    #[test]
    fn skipped_parent_keeps_child_out() {
        bch_test::init();

        let huge_parent = MempoolEntry::fake(spend(1, 1_000), 100_000, 9_000_000, 1, 0, vec![]);
        let child =
            MempoolEntry::fake(spend(2, 900), 50_000, 300, 1, 0, vec![huge_parent.hash]);
        let selected = run_selection(vec![huge_parent, child], |_| {});
        assert!(selected.is_empty());
    }

    #[test]
    fn priority_phase_admits_old_coins_first() {
        bch_test::init();

        // Zero fee but enormous coin age: only selectable via the
        // priority carve-out.
        let aged = MempoolEntry::fake(spend(1, 1_000), 0, 250, 1, u128::from(u64::MAX), vec![]);
        let paying = MempoolEntry::fake(spend(2, 1_000), 10_000, 250, 1, 0, vec![]);

        let without_priority = run_selection(vec![aged.clone(), paying.clone()], |options| {
            options.priority_size = 0;
        });
        // The zero-fee transaction still gets in (no minimum rate is
        // enforced by the assembler itself), so check the priority phase
        // by threshold instead.
        assert_eq!(without_priority.len(), 2);

        let with_priority = run_selection(vec![aged.clone(), paying.clone()], |options| {
            options.priority_size = 50_000;
        });
        assert_eq!(with_priority.len(), 2);
        assert!(with_priority.contains(&aged.hash));
    }

    #[test]
    fn coinbase_pushes_height_and_flags() {
        bch_test::init();

        let address = Address::PayToPublicKeyHash {
            network: bch_chain::parameters::Network::Regtest,
            pub_key_hash: [0x22; 20],
        };
        let options = AssemblerOptions::new(address);
        let coinbase = build_coinbase(
            Height(17),
            Amount::try_from(50 * COIN).unwrap(),
            &options,
        );
        assert!(coinbase.is_coinbase());
        match &coinbase.inputs[0] {
            Input::Coinbase { data, .. } => {
                let bytes = data.as_ref();
                // OP_17 does not exist; 17 is a one-byte push.
                assert_eq!(&bytes[..2], &[0x01, 17]);
                assert_eq!(bytes[2] as usize, options.coinbase_flags.len());
                assert!(bytes.len() <= 100);
            }
            _ => unreachable!(),
        }
    }
}
