use std::sync::Arc;

use super::Sequence;
use crate::error::{MetapathError, codes};

/// An immutable array of member sequences, indexed from 1.
#[derive(Debug, Clone, Default)]
pub struct XdmArray {
    members: Arc<Vec<Sequence>>,
}

impl XdmArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_members(members: Vec<Sequence>) -> Self {
        Self {
            members: Arc::new(members),
        }
    }

    /// Validates a 1-based position, returning the 0-based offset.
    fn offset(&self, position: i64) -> Result<usize, MetapathError> {
        if position < 1 || position as u64 > self.members.len() as u64 {
            return Err(MetapathError::ArrayIndexOutOfBounds {
                index: position,
                size: self.members.len(),
            });
        }
        Ok((position - 1) as usize)
    }

    pub fn get(&self, position: i64) -> Result<&Sequence, MetapathError> {
        let offset = self.offset(position)?;
        Ok(&self.members[offset])
    }

    pub fn put(&self, position: i64, member: Sequence) -> Result<Self, MetapathError> {
        let offset = self.offset(position)?;
        let mut members = (*self.members).clone();
        members[offset] = member;
        Ok(Self::from_members(members))
    }

    pub fn append(&self, member: Sequence) -> Self {
        let mut members = (*self.members).clone();
        members.push(member);
        Self::from_members(members)
    }

    /// Inserts before `position`; `size + 1` appends.
    pub fn insert_before(&self, position: i64, member: Sequence) -> Result<Self, MetapathError> {
        let offset = if position == self.members.len() as i64 + 1 {
            self.members.len()
        } else {
            self.offset(position)?
        };
        let mut members = (*self.members).clone();
        members.insert(offset, member);
        Ok(Self::from_members(members))
    }

    pub fn remove(&self, positions: &[i64]) -> Result<Self, MetapathError> {
        let mut offsets = positions
            .iter()
            .map(|&p| self.offset(p))
            .collect::<Result<Vec<_>, _>>()?;
        offsets.sort_unstable();
        offsets.dedup();
        let members = self
            .members
            .iter()
            .enumerate()
            .filter(|(i, _)| offsets.binary_search(i).is_err())
            .map(|(_, m)| m.clone())
            .collect();
        Ok(Self::from_members(members))
    }

    pub fn subarray(&self, start: i64, length: Option<i64>) -> Result<Self, MetapathError> {
        let size = self.members.len() as i64;
        if start < 1 || start > size + 1 {
            return Err(MetapathError::ArrayIndexOutOfBounds {
                index: start,
                size: self.members.len(),
            });
        }
        let length = length.unwrap_or(size - start + 1);
        if length < 0 {
            return Err(MetapathError::function(
                codes::FOAY0002,
                format!("Negative array length {}", length),
            ));
        }
        if start + length > size + 1 {
            return Err(MetapathError::ArrayIndexOutOfBounds {
                index: start + length - 1,
                size: self.members.len(),
            });
        }
        let from = (start - 1) as usize;
        let to = from + length as usize;
        Ok(Self::from_members(self.members[from..to].to_vec()))
    }

    pub fn head(&self) -> Result<&Sequence, MetapathError> {
        self.get(1)
    }

    pub fn tail(&self) -> Result<Self, MetapathError> {
        if self.members.is_empty() {
            return Err(MetapathError::ArrayIndexOutOfBounds { index: 1, size: 0 });
        }
        Ok(Self::from_members(self.members[1..].to_vec()))
    }

    pub fn reverse(&self) -> Self {
        Self::from_members(self.members.iter().rev().cloned().collect())
    }

    pub fn join(arrays: &[XdmArray]) -> Self {
        Self::from_members(
            arrays
                .iter()
                .flat_map(|a| a.members.iter().cloned())
                .collect(),
        )
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> &[Sequence] {
        &self.members
    }
}

impl PartialEq for XdmArray {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.members, &other.members) || self.members == other.members
    }
}
