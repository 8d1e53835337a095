//! Binary tree navigation for group and management commissions.
//!
//! Every walk carries a visited set so a corrupted parent chain (a cycle)
//! terminates with a warning instead of looping.

use crate::db::{LedgerTx, Repository};
use crate::domain::{LegSide, Member, MemberId, MAX_MANAGEMENT_LEVEL};
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::warn;

/// Read access to tree nodes.
///
/// Implemented by `LedgerTx` so navigation sees the in-flight writes of the
/// order being processed.
#[async_trait]
pub trait MemberSource: Send {
    async fn load_member(&mut self, id: MemberId) -> Result<Option<Member>, sqlx::Error>;

    async fn child_at(
        &mut self,
        parent: MemberId,
        side: LegSide,
    ) -> Result<Option<MemberId>, sqlx::Error>;
}

#[async_trait]
impl MemberSource for LedgerTx {
    async fn load_member(&mut self, id: MemberId) -> Result<Option<Member>, sqlx::Error> {
        self.get_member(id).await
    }

    async fn child_at(
        &mut self,
        parent: MemberId,
        side: LegSide,
    ) -> Result<Option<MemberId>, sqlx::Error> {
        LedgerTx::child_at(self, parent, side).await
    }
}

/// Committed state, for lookups outside an order's transaction.
#[async_trait]
impl<'r> MemberSource for &'r Repository {
    async fn load_member(&mut self, id: MemberId) -> Result<Option<Member>, sqlx::Error> {
        self.get_member(id).await
    }

    async fn child_at(
        &mut self,
        parent: MemberId,
        side: LegSide,
    ) -> Result<Option<MemberId>, sqlx::Error> {
        Repository::child_at(*self, parent, side).await
    }
}

/// One step of a buyer's upline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lineage {
    pub ancestor: Member,
    /// Leg of `ancestor` that contains the buyer.
    pub side: LegSide,
    /// 1 for the direct parent.
    pub generation: u32,
}

pub struct TreeNavigator;

impl TreeNavigator {
    /// Ancestors of `member`, nearest first, up to the root.
    ///
    /// Stops at a missing parent or a revisited node, logging a warning.
    pub async fn ancestors_of<S>(source: &mut S, member: &Member) -> Result<Vec<Member>, sqlx::Error>
    where
        S: MemberSource + ?Sized,
    {
        let mut visited = HashSet::from([member.id]);
        let mut ancestors = Vec::new();
        let mut next = member.parent_id;

        while let Some(parent_id) = next {
            if !visited.insert(parent_id) {
                warn!(member_id = %member.id, at = %parent_id, "Cycle in parent chain, stopping walk");
                break;
            }
            let Some(parent) = source.load_member(parent_id).await? else {
                warn!(member_id = %member.id, missing = %parent_id, "Parent not found, stopping walk");
                break;
            };
            next = parent.parent_id;
            ancestors.push(parent);
        }

        Ok(ancestors)
    }

    /// Ancestors of `member` paired with the leg each one reaches it through.
    pub async fn lineage<S>(source: &mut S, member: &Member) -> Result<Vec<Lineage>, sqlx::Error>
    where
        S: MemberSource + ?Sized,
    {
        let ancestors = Self::ancestors_of(source, member).await?;
        let mut steps = Vec::with_capacity(ancestors.len());
        let mut child = member;
        for (idx, ancestor) in ancestors.iter().enumerate() {
            let side = child.position.unwrap_or_else(|| {
                warn!(member_id = %child.id, "Placed member has no position, assuming left");
                LegSide::Left
            });
            steps.push(Lineage {
                ancestor: ancestor.clone(),
                side,
                generation: idx as u32 + 1,
            });
            child = ancestor;
        }
        Ok(steps)
    }

    /// Leg of `ancestor_id` that contains `member`.
    ///
    /// Falls back to `Left` with a warning when `member` is not below the
    /// ancestor.
    pub async fn side_of<S>(
        source: &mut S,
        member: &Member,
        ancestor_id: MemberId,
    ) -> Result<LegSide, sqlx::Error>
    where
        S: MemberSource + ?Sized,
    {
        let steps = Self::lineage(source, member).await?;
        match steps.iter().find(|step| step.ancestor.id == ancestor_id) {
            Some(step) => Ok(step.side),
            None => {
                warn!(member_id = %member.id, ancestor_id = %ancestor_id, "Member is not below ancestor, assuming left");
                Ok(LegSide::Left)
            }
        }
    }

    /// Whether `member_id` has a child on both legs.
    pub async fn both_subtrees_populated<S>(
        source: &mut S,
        member_id: MemberId,
    ) -> Result<bool, sqlx::Error>
    where
        S: MemberSource + ?Sized,
    {
        Ok(source.child_at(member_id, LegSide::Left).await?.is_some()
            && source.child_at(member_id, LegSide::Right).await?.is_some())
    }

    /// Leg with the smaller accumulated volume, read fresh from `source`.
    ///
    /// `None` when the legs are equal (either may pay) or the member is gone.
    pub async fn weak_side<S>(
        source: &mut S,
        member_id: MemberId,
    ) -> Result<Option<LegSide>, sqlx::Error>
    where
        S: MemberSource + ?Sized,
    {
        Ok(source
            .load_member(member_id)
            .await?
            .and_then(|m| weaker_leg(&m)))
    }

    /// Generation distance from `descendant` up to `ancestor_id`, if it is
    /// within the management depth.
    pub async fn generation_level<S>(
        source: &mut S,
        descendant: &Member,
        ancestor_id: MemberId,
    ) -> Result<Option<u8>, sqlx::Error>
    where
        S: MemberSource + ?Sized,
    {
        let mut visited = HashSet::from([descendant.id]);
        let mut next = descendant.parent_id;

        for level in 1..=MAX_MANAGEMENT_LEVEL {
            let Some(parent_id) = next else {
                return Ok(None);
            };
            if parent_id == ancestor_id {
                return Ok(Some(level));
            }
            if !visited.insert(parent_id) {
                return Ok(None);
            }
            next = match source.load_member(parent_id).await? {
                Some(parent) => parent.parent_id,
                None => return Ok(None),
            };
        }
        Ok(None)
    }
}

/// Weaker leg of `member` by accumulated volume, `None` on a tie.
pub fn weaker_leg(member: &Member) -> Option<LegSide> {
    use std::cmp::Ordering;
    match member.left_subtree_volume.cmp(&member.right_subtree_volume) {
        Ordering::Less => Some(LegSide::Left),
        Ordering::Greater => Some(LegSide::Right),
        Ordering::Equal => None,
    }
}


#[cfg(test)]
mod tests {
    use super::memory::MemoryTree;
    use super::*;
    use crate::domain::member::test_member;
    use crate::domain::{Decimal, Tier};

    /// 1 at the root, 2 left of 1, 3 right of 1, 4 left of 2, 5 right of 4.
    fn sample_tree() -> MemoryTree {
        let mut tree = MemoryTree::default();
        tree.insert(test_member(1, None, Tier::Tier2));
        tree.insert(test_member(2, Some((1, LegSide::Left)), Tier::Tier1));
        tree.insert(test_member(3, Some((1, LegSide::Right)), Tier::Tier1));
        tree.insert(test_member(4, Some((2, LegSide::Left)), Tier::None));
        tree.insert(test_member(5, Some((4, LegSide::Right)), Tier::None));
        tree
    }

    #[tokio::test]
    async fn test_ancestors_nearest_first() {
        let mut tree = sample_tree();
        let leaf = tree.members[&MemberId(5)].clone();
        let ids: Vec<i64> = TreeNavigator::ancestors_of(&mut tree, &leaf)
            .await
            .unwrap()
            .iter()
            .map(|m| m.id.as_i64())
            .collect();
        assert_eq!(ids, vec![4, 2, 1]);
    }

    #[tokio::test]
    async fn test_lineage_sides_and_generations() {
        let mut tree = sample_tree();
        let leaf = tree.members[&MemberId(5)].clone();
        let steps = TreeNavigator::lineage(&mut tree, &leaf).await.unwrap();
        let view: Vec<(i64, LegSide, u32)> = steps
            .iter()
            .map(|s| (s.ancestor.id.as_i64(), s.side, s.generation))
            .collect();
        assert_eq!(
            view,
            vec![
                (4, LegSide::Right, 1),
                (2, LegSide::Left, 2),
                (1, LegSide::Left, 3),
            ]
        );
    }

    #[tokio::test]
    async fn test_cycle_terminates() {
        let mut tree = MemoryTree::default();
        tree.insert(test_member(1, Some((2, LegSide::Left)), Tier::Tier1));
        tree.insert(test_member(2, Some((1, LegSide::Right)), Tier::Tier1));
        let start = tree.members[&MemberId(1)].clone();

        let ancestors = TreeNavigator::ancestors_of(&mut tree, &start).await.unwrap();
        assert_eq!(ancestors.len(), 1);
        assert_eq!(
            TreeNavigator::generation_level(&mut tree, &start, MemberId(99))
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_missing_parent_stops_walk() {
        let mut tree = MemoryTree::default();
        tree.insert(test_member(7, Some((42, LegSide::Left)), Tier::Tier1));
        let start = tree.members[&MemberId(7)].clone();
        assert!(TreeNavigator::ancestors_of(&mut tree, &start)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_side_of_and_fallback() {
        let mut tree = sample_tree();
        let leaf = tree.members[&MemberId(5)].clone();
        assert_eq!(
            TreeNavigator::side_of(&mut tree, &leaf, MemberId(1)).await.unwrap(),
            LegSide::Left
        );
        assert_eq!(
            TreeNavigator::side_of(&mut tree, &leaf, MemberId(4)).await.unwrap(),
            LegSide::Right
        );
        // 3 is not an ancestor of 5.
        assert_eq!(
            TreeNavigator::side_of(&mut tree, &leaf, MemberId(3)).await.unwrap(),
            LegSide::Left
        );
    }

    #[tokio::test]
    async fn test_both_subtrees_populated() {
        let mut tree = sample_tree();
        assert!(TreeNavigator::both_subtrees_populated(&mut tree, MemberId(1))
            .await
            .unwrap());
        assert!(!TreeNavigator::both_subtrees_populated(&mut tree, MemberId(2))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_weak_side() {
        let mut tree = sample_tree();
        assert_eq!(
            TreeNavigator::weak_side(&mut tree, MemberId(1)).await.unwrap(),
            None
        );

        if let Some(root) = tree.members.get_mut(&MemberId(1)) {
            root.left_subtree_volume = Decimal::from(100);
            root.right_subtree_volume = Decimal::from(40);
        }
        assert_eq!(
            TreeNavigator::weak_side(&mut tree, MemberId(1)).await.unwrap(),
            Some(LegSide::Right)
        );
        assert_eq!(
            TreeNavigator::weak_side(&mut tree, MemberId(404)).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_generation_level_capped() {
        let mut tree = sample_tree();
        tree.insert(test_member(6, Some((5, LegSide::Left)), Tier::None));
        let leaf = tree.members[&MemberId(6)].clone();

        assert_eq!(
            TreeNavigator::generation_level(&mut tree, &leaf, MemberId(5)).await.unwrap(),
            Some(1)
        );
        assert_eq!(
            TreeNavigator::generation_level(&mut tree, &leaf, MemberId(2)).await.unwrap(),
            Some(3)
        );
        // Root is four generations up.
        assert_eq!(
            TreeNavigator::generation_level(&mut tree, &leaf, MemberId(1)).await.unwrap(),
            None
        );
    }
}
