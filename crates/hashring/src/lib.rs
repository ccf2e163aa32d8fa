// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Consistent hashing over a set of named peers.
//!
//! [`HashRing`] places every peer at a configurable number of virtual positions on a 32-bit
//! ring. Looking up a key hashes it and walks clockwise to the nearest position, so each key
//! has exactly one owner and a change of membership moves only the keys adjacent to the
//! positions that appeared or disappeared.
//!
//! # Example
//!
//! ```
//! use hashring::HashRing;
//!
//! let mut ring = HashRing::new(3);
//! ring.add(["peer-a", "peer-b"]);
//!
//! let owner = ring.get("some key").unwrap();
//! assert!(owner == "peer-a" || owner == "peer-b");
//!
//! // Lookups are deterministic.
//! assert_eq!(ring.get("some key"), Some(owner));
//! ```

use std::collections::HashMap;
use std::fmt::{self, Debug};

use foldhash::fast::RandomState;

/// Signature of the hash used to place peers and keys on the ring.
pub type HashFn = fn(&[u8]) -> u32;

/// A consistent hash ring mapping keys to peers.
///
/// Positions are kept sorted, so lookups are a binary search over `peers × replicas` entries.
#[derive(Clone)]
pub struct HashRing {
    hash: HashFn,
    replicas: usize,
    positions: Vec<u32>,
    owners: HashMap<u32, String, RandomState>,
}

impl HashRing {
    /// Creates an empty ring that hashes with CRC-32.
    #[must_use]
    pub fn new(replicas: usize) -> Self {
        Self::with_hasher(replicas, crc32fast::hash)
    }

    /// Creates an empty ring using a custom hash function.
    ///
    /// ```
    /// use hashring::HashRing;
    ///
    /// fn first_byte(data: &[u8]) -> u32 {
    ///     data.first().copied().map_or(0, u32::from)
    /// }
    ///
    /// let mut ring = HashRing::with_hasher(1, first_byte);
    /// ring.add(["a"]);
    /// assert_eq!(ring.get("zzz"), Some("a"));
    /// ```
    #[must_use]
    pub fn with_hasher(replicas: usize, hash: HashFn) -> Self {
        Self {
            hash,
            replicas,
            positions: Vec::new(),
            owners: HashMap::default(),
        }
    }

    /// Places each peer on the ring at `replicas` positions.
    ///
    /// The position of replica `i` of `peer` is `hash(format!("{i}{peer}"))`. When two
    /// positions collide, the peer added last owns it.
    pub fn add<I>(&mut self, peers: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut added = 0_usize;
        for peer in peers {
            let peer = peer.as_ref();
            for replica in 0..self.replicas {
                let position = (self.hash)(format!("{replica}{peer}").as_bytes());
                self.positions.push(position);
                self.owners.insert(position, peer.to_owned());
            }
            added += 1;
        }

        self.positions.sort_unstable();
        self.positions.dedup();

        tracing::event!(
            name: "hashring.rebuild",
            tracing::Level::DEBUG,
            ring.peers_added = added,
            ring.replicas = self.replicas,
            ring.positions = self.positions.len(),
        );
    }

    /// Returns the peer owning `key`, or `None` if the ring has no peers.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        let first = *self.positions.first()?;
        let hash = (self.hash)(key.as_bytes());

        let idx = self.positions.partition_point(|&position| position < hash);
        let position = self.positions.get(idx).copied().unwrap_or(first);

        self.owners.get(&position).map(String::as_str)
    }

    /// Returns `true` if no peer has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Returns the number of virtual positions on the ring.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns the number of positions each peer occupies.
    #[must_use]
    pub fn replicas(&self) -> usize {
        self.replicas
    }
}

impl Debug for HashRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashRing")
            .field("replicas", &self.replicas)
            .field("positions", &self.positions.len())
            .finish_non_exhaustive()
    }
}
