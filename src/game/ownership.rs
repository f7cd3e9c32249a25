use std::collections::BTreeMap;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::board::{BoardCatalog, SquareId};
use crate::types::PropertyGroup;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipRecord {
    pub owner: usize,
    pub mortgaged: bool,
    pub houses: u8,
    /// Acquisition sequence number; bumps every time the property changes hands.
    pub version: u64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OwnershipError {
    #[error("square {0} is not a property")]
    NotAProperty(SquareId),
    #[error("property {0} is already owned")]
    AlreadyOwned(SquareId),
    #[error("property {property} is not owned by player {player}")]
    NotOwner { property: SquareId, player: usize },
    #[error("property {0} is already mortgaged")]
    AlreadyMortgaged(SquareId),
    #[error("property {0} is not mortgaged")]
    NotMortgaged(SquareId),
    #[error("property {0} has buildings")]
    Developed(SquareId),
}

/// The session's authoritative property-to-owner map: one record per property at most.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipIndex {
    records: BTreeMap<SquareId, OwnershipRecord>,
    next_version: u64,
}

impl OwnershipIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, property: SquareId) -> Option<&OwnershipRecord> {
        self.records.get(&property)
    }

    pub fn owner_of(&self, property: SquareId) -> Option<usize> {
        self.records.get(&property).map(|record| record.owner)
    }

    pub fn version_of(&self, property: SquareId) -> Option<u64> {
        self.records.get(&property).map(|record| record.version)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SquareId, &OwnershipRecord)> + '_ {
        self.records.iter().map(|(property, record)| (*property, record))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn properties_of(&self, player: usize) -> Vec<SquareId> {
        self.records
            .iter()
            .filter(|(_, record)| record.owner == player)
            .map(|(property, _)| *property)
            .collect()
    }

    pub fn count_in_group(&self, board: &BoardCatalog, player: usize, group: PropertyGroup) -> usize {
        board
            .group_members(group)
            .iter()
            .filter(|member| self.owner_of(**member) == Some(player))
            .count()
    }

    pub fn owns_group(&self, board: &BoardCatalog, player: usize, group: PropertyGroup) -> bool {
        let size = board.group_size(group);
        size > 0 && self.count_in_group(board, player, group) == size
    }

    pub fn acquire(
        &mut self,
        board: &BoardCatalog,
        property: SquareId,
        player: usize,
    ) -> Result<&OwnershipRecord, OwnershipError> {
        if board.property(property).is_none() {
            return Err(OwnershipError::NotAProperty(property));
        }
        if self.records.contains_key(&property) {
            return Err(OwnershipError::AlreadyOwned(property));
        }
        let version = self.bump_version();
        Ok(self.records.entry(property).or_insert(OwnershipRecord {
            owner: player,
            mortgaged: false,
            houses: 0,
            version,
        }))
    }

    /// Moves an owned property to `to`, keeping its mortgage state.
    pub fn transfer(&mut self, property: SquareId, from: usize, to: usize) -> Result<(), OwnershipError> {
        let version = self.next_version + 1;
        let record = self
            .records
            .get_mut(&property)
            .filter(|record| record.owner == from)
            .ok_or(OwnershipError::NotOwner {
                property,
                player: from,
            })?;
        record.owner = to;
        record.version = version;
        self.next_version = version;
        Ok(())
    }

    /// Returns every property of `player` to the bank, clearing mortgages and buildings.
    pub fn release_all(&mut self, player: usize) -> Vec<SquareId> {
        let released = self.properties_of(player);
        for property in &released {
            self.records.remove(property);
        }
        released
    }

    pub fn mortgage(&mut self, property: SquareId, player: usize) -> Result<(), OwnershipError> {
        let record = self.owned_record_mut(property, player)?;
        if record.mortgaged {
            return Err(OwnershipError::AlreadyMortgaged(property));
        }
        if record.houses > 0 {
            return Err(OwnershipError::Developed(property));
        }
        record.mortgaged = true;
        Ok(())
    }

    pub fn unmortgage(&mut self, property: SquareId, player: usize) -> Result<(), OwnershipError> {
        let record = self.owned_record_mut(property, player)?;
        if !record.mortgaged {
            return Err(OwnershipError::NotMortgaged(property));
        }
        record.mortgaged = false;
        Ok(())
    }

    /// Unmortgaged, undeveloped properties of `player`, highest mortgage value first.
    pub fn liquidation_order(&self, board: &BoardCatalog, player: usize) -> Vec<SquareId> {
        self.records
            .iter()
            .filter(|(_, record)| record.owner == player && !record.mortgaged && record.houses == 0)
            .filter_map(|(property, _)| {
                board
                    .property(*property)
                    .map(|info| (info.mortgage_value(), *property))
            })
            .sorted_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)))
            .map(|(_, property)| property)
            .collect()
    }

    fn owned_record_mut(
        &mut self,
        property: SquareId,
        player: usize,
    ) -> Result<&mut OwnershipRecord, OwnershipError> {
        self.records
            .get_mut(&property)
            .filter(|record| record.owner == player)
            .ok_or(OwnershipError::NotOwner { property, player })
    }

    fn bump_version(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }
}
