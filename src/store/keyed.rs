//! Build sink for `T(...)` and `H(...)` containers.
//!
//! Phase one collects a skeleton per instance: binary key → `Slot`. The
//! payloads themselves stay in a staging area. `finish` fixes the final
//! storage order (sorted keys for a trie, bucket order for a hash) and
//! returns the section bytes plus the staged handles in that order, so the
//! caller can re-stream the payloads to build the value container.

use std::collections::BTreeMap;
use std::io;

use crate::staging::StageHandle;
use crate::store::{SectionTag, hash, put_u64s, write_section};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Presence,
    Staged(StageHandle),
}

pub struct BuiltKeyed {
    pub bytes: Vec<u8>,                  // complete section, header included
    pub final_order: Vec<StageHandle>,   // staged payloads in storage order
    pub entries: u64,
}

pub struct KeyedSink {
    ordinal: u32,
    ordered: bool,
    set: bool,
    args: Vec<String>,
    instances: Vec<BTreeMap<Vec<u8>, Slot>>,
}

impl KeyedSink {
    pub fn begin(ordinal: u32, ordered: bool, set: bool, args: &[String]) -> Self {
        Self {
            ordinal,
            ordered,
            set,
            args: args.to_vec(),
            instances: Vec::new(),
        }
    }

    pub fn start_instance(&mut self) {
        self.instances.push(BTreeMap::new());
    }

    pub fn instances(&self) -> u64 {
        self.instances.len() as u64
    }

    /// A repeated key replaces the earlier slot.
    pub fn insert(&mut self, key: Vec<u8>, slot: Slot) {
        if self.instances.is_empty() {
            self.start_instance();
        }
        if let Some(map) = self.instances.last_mut() {
            map.insert(key, slot);
        }
    }

    pub fn finish(self) -> io::Result<BuiltKeyed> {
        let mut entry_starts = vec![0u64];
        let mut key_offsets = vec![0u64];
        let mut keys = Vec::new();
        let mut bucket_index = vec![0u64];
        let mut bucket_table = Vec::new();
        let mut final_order = Vec::new();

        for map in self.instances {
            let mut entries: Vec<(Vec<u8>, Slot)> = map.into_iter().collect();

            if !self.ordered {
                let buckets = hash::bucket_count(entries.len());
                entries.sort_by_cached_key(|(k, _)| (hash::bucket_of(k, buckets), k.clone()));
                let mut bounds = vec![0u64; buckets as usize + 1];
                for (k, _) in &entries {
                    bounds[hash::bucket_of(k, buckets) as usize + 1] += 1;
                }
                for b in 1..bounds.len() {
                    bounds[b] += bounds[b - 1];
                }
                bucket_table.extend_from_slice(&bounds);
                bucket_index.push(bucket_table.len() as u64);
            }

            for (key, slot) in entries {
                keys.extend_from_slice(&key);
                key_offsets.push(keys.len() as u64);
                if let Slot::Staged(h) = slot {
                    final_order.push(h);
                }
            }
            entry_starts.push(key_offsets.len() as u64 - 1);
        }

        let instances = entry_starts.len() as u64 - 1;
        let entries = key_offsets.len() as u64 - 1;
        let mut body = Vec::new();
        body.push(u8::from(self.set));
        body.extend_from_slice(&instances.to_le_bytes());
        put_u64s(&mut body, &entry_starts);
        put_u64s(&mut body, &key_offsets);
        body.extend_from_slice(&keys);
        let tag = if self.ordered {
            SectionTag::Trie
        } else {
            put_u64s(&mut body, &bucket_index);
            put_u64s(&mut body, &bucket_table);
            SectionTag::Hash
        };

        let mut bytes = Vec::with_capacity(body.len() + 32);
        write_section(&mut bytes, tag, self.ordinal, &self.args, &body)?;
        Ok(BuiltKeyed {
            bytes,
            final_order,
            entries,
        })
    }
}
