use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use tracing::instrument;

use chorus_core::entry::{meta, Author};
use chorus_core::{Entry, EntryId};
use chorus_store::EntryRepo;

use crate::error::EngineError;

/// A branch described for callers: the fork entry plus where it forked.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BranchInfo {
    pub branch_id: EntryId,
    pub base_id: EntryId,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
    pub metadata: Map<String, Value>,
}

/// Lineage divergence between two entries, anchored at their nearest
/// common ancestor.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BranchDiff {
    pub common_ancestor: Option<EntryId>,
    pub branch_only: Vec<Entry>,
    pub base_only: Vec<Entry>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    Auto,
    Manual,
    Rebase,
}

impl FromStr for MergeStrategy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            "rebase" => Ok(Self::Rebase),
            other => Err(format!("unknown merge strategy: {other}")),
        }
    }
}

/// Result of a merge. Only ever appends; the entries already in the tree
/// are untouched regardless of strategy.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum MergeOutcome {
    /// Auto strategy appended the source tip's content under the target.
    Merged { entry: Entry },
    /// Auto strategy found concurrent children under the target.
    Conflict { divergent: Vec<Entry> },
    /// Manual strategy: divergence handed back for external resolution.
    ManualReview {
        branch_only: Vec<Entry>,
        base_only: Vec<Entry>,
    },
    /// Rebase strategy replayed the source-only entries onto the target.
    Rebased {
        new_tip: EntryId,
        appended: Vec<Entry>,
    },
}

/// Forks lineages and compares them. Operates directly on the entry
/// store; workflow state is not involved.
#[derive(Clone)]
pub struct BranchManager {
    repo: EntryRepo,
}

impl BranchManager {
    pub fn new(repo: EntryRepo) -> Self {
        Self { repo }
    }

    /// Fork a new lineage from `base_id`.
    ///
    /// The fork is an ordinary entry: a child of the base carrying the
    /// base's content, authored by the system, with `branch_from`
    /// metadata. "The branch" is simply the subtree rooted there.
    #[instrument(skip(self, new_prompt), fields(base_id = %base_id))]
    pub fn create_branch(&self, base_id: &EntryId, new_prompt: &str) -> Result<Entry, EngineError> {
        let base = self.repo.get(base_id)?;
        let fork = Entry::child_of(
            base_id,
            base.content,
            new_prompt,
            Author::System("Branch".into()),
        )
        .with_meta(meta::BRANCH_FROM, base_id.to_string());
        Ok(self.repo.insert(&fork)?)
    }

    /// Every fork point in the subtree under `root_id`.
    #[instrument(skip(self), fields(root_id = %root_id))]
    pub fn list_branches(&self, root_id: &EntryId) -> Result<Vec<BranchInfo>, EngineError> {
        let branches = self
            .repo
            .subtree(root_id)?
            .into_iter()
            .filter_map(|entry| {
                let base = entry.meta_str(meta::BRANCH_FROM)?.to_owned();
                Some(BranchInfo {
                    branch_id: entry.id.clone(),
                    base_id: EntryId::from_raw(base),
                    prompt: entry.prompt.clone(),
                    created_at: entry.created_at,
                    metadata: entry.metadata,
                })
            })
            .collect();
        Ok(branches)
    }

    /// Entries on each side since the lineages diverged.
    ///
    /// Ancestor chains share a strict prefix (every entry has one
    /// parent), so the nearest common ancestor is the last entry of the
    /// common prefix.
    #[instrument(skip(self), fields(branch_id = %branch_id, base_id = %base_id))]
    pub fn diff(&self, branch_id: &EntryId, base_id: &EntryId) -> Result<BranchDiff, EngineError> {
        let branch_chain = self.repo.ancestor_chain(branch_id)?;
        let base_chain = self.repo.ancestor_chain(base_id)?;

        let mut prefix = 0;
        while prefix < branch_chain.len().min(base_chain.len())
            && branch_chain[prefix].id == base_chain[prefix].id
        {
            prefix += 1;
        }

        Ok(BranchDiff {
            common_ancestor: prefix
                .checked_sub(1)
                .map(|i| branch_chain[i].id.clone()),
            branch_only: branch_chain[prefix..].to_vec(),
            base_only: base_chain[prefix..].to_vec(),
        })
    }

    /// Merge `source_id`'s lineage toward `target_id`.
    #[instrument(skip(self), fields(source_id = %source_id, target_id = %target_id, ?strategy))]
    pub fn merge(
        &self,
        source_id: &EntryId,
        target_id: &EntryId,
        strategy: MergeStrategy,
    ) -> Result<MergeOutcome, EngineError> {
        match strategy {
            MergeStrategy::Auto => {
                // A concurrent branch under the target blocks auto-merge.
                if !self.repo.children(target_id)?.is_empty() {
                    let diff = self.diff(source_id, target_id)?;
                    return Ok(MergeOutcome::Conflict {
                        divergent: diff.branch_only,
                    });
                }
                let source = self.repo.get(source_id)?;
                let merged = Entry::child_of(
                    target_id,
                    source.content,
                    "",
                    Author::System("Merge".into()),
                )
                .with_meta(meta::MERGED_FROM, source_id.to_string());
                Ok(MergeOutcome::Merged {
                    entry: self.repo.insert(&merged)?,
                })
            }
            MergeStrategy::Manual => {
                let diff = self.diff(source_id, target_id)?;
                Ok(MergeOutcome::ManualReview {
                    branch_only: diff.branch_only,
                    base_only: diff.base_only,
                })
            }
            MergeStrategy::Rebase => {
                let diff = self.diff(source_id, target_id)?;
                let mut tip = target_id.clone();
                let mut appended = Vec::with_capacity(diff.branch_only.len());
                for original in &diff.branch_only {
                    let copy = Entry::child_of(
                        &tip,
                        original.content.clone(),
                        original.prompt.clone(),
                        original.author.clone(),
                    )
                    .with_meta(meta::REBASED_FROM, original.id.to_string());
                    let stored = self.repo.insert(&copy)?;
                    tip = stored.id.clone();
                    appended.push(stored);
                }
                Ok(MergeOutcome::Rebased {
                    new_tip: tip,
                    appended,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_store::{Database, StoreError};

    fn setup() -> (EntryRepo, BranchManager) {
        let repo = EntryRepo::new(Database::in_memory().unwrap());
        (repo.clone(), BranchManager::new(repo))
    }

    fn insert_chain(repo: &EntryRepo, contents: &[&str]) -> Vec<Entry> {
        let mut out = Vec::new();
        let root = repo
            .insert(&Entry::root(contents[0], "", Author::User("Initiator".into())))
            .unwrap();
        let mut tip = root.id.clone();
        out.push(root);
        for content in &contents[1..] {
            let child = repo
                .insert(&Entry::child_of(&tip, *content, "p", Author::Ai("echo".into())))
                .unwrap();
            tip = child.id.clone();
            out.push(child);
        }
        out
    }

    #[test]
    fn branch_clones_base_content() {
        let (repo, branches) = setup();
        let chain = insert_chain(&repo, &["R", "C1"]);

        let fork = branches.create_branch(&chain[1].id, "alternate direction").unwrap();
        assert_eq!(fork.parent_id.as_ref(), Some(&chain[1].id));
        assert_eq!(fork.content, "C1");
        assert_eq!(fork.prompt, "alternate direction");
        assert_eq!(fork.author, Author::System("Branch".into()));
        assert_eq!(fork.meta_str(meta::BRANCH_FROM), Some(chain[1].id.as_str()));
    }

    #[test]
    fn branch_becomes_sibling_of_next_step() {
        let (repo, branches) = setup();
        let chain = insert_chain(&repo, &["R", "C1", "C2"]);

        let fork = branches.create_branch(&chain[1].id, "alt").unwrap();
        let kids = repo.children(&chain[1].id).unwrap();
        let ids: Vec<_> = kids.iter().map(|e| e.id.clone()).collect();
        assert!(ids.contains(&chain[2].id));
        assert!(ids.contains(&fork.id));
    }

    #[test]
    fn branch_from_unknown_base_fails() {
        let (_, branches) = setup();
        let result = branches.create_branch(&EntryId::new(), "alt");
        assert!(matches!(
            result,
            Err(EngineError::Store(StoreError::NotFound(_)))
        ));
    }

    #[test]
    fn list_branches_finds_forks() {
        let (repo, branches) = setup();
        let chain = insert_chain(&repo, &["R", "C1", "C2"]);

        branches.create_branch(&chain[1].id, "alt one").unwrap();
        branches.create_branch(&chain[2].id, "alt two").unwrap();

        let infos = branches.list_branches(&chain[0].id).unwrap();
        assert_eq!(infos.len(), 2);
        let prompts: Vec<_> = infos.iter().map(|b| b.prompt.clone()).collect();
        assert!(prompts.contains(&"alt one".to_owned()));
        assert!(prompts.contains(&"alt two".to_owned()));
    }

    #[test]
    fn diff_anchors_at_common_ancestor() {
        let (repo, branches) = setup();
        let chain = insert_chain(&repo, &["R", "C1"]);

        // Two lineages forked from C1.
        let a1 = repo
            .insert(&Entry::child_of(&chain[1].id, "a1", "", Author::Ai("echo".into())))
            .unwrap();
        let a2 = repo
            .insert(&Entry::child_of(&a1.id, "a2", "", Author::Ai("echo".into())))
            .unwrap();
        let b1 = repo
            .insert(&Entry::child_of(&chain[1].id, "b1", "", Author::Ai("echo".into())))
            .unwrap();

        let diff = branches.diff(&a2.id, &b1.id).unwrap();
        assert_eq!(diff.common_ancestor.as_ref(), Some(&chain[1].id));
        let branch_ids: Vec<_> = diff.branch_only.iter().map(|e| e.id.clone()).collect();
        assert_eq!(branch_ids, vec![a1.id, a2.id]);
        let base_ids: Vec<_> = diff.base_only.iter().map(|e| e.id.clone()).collect();
        assert_eq!(base_ids, vec![b1.id]);
    }

    #[test]
    fn diff_of_ancestor_and_descendant() {
        let (repo, branches) = setup();
        let chain = insert_chain(&repo, &["R", "C1", "C2"]);

        let diff = branches.diff(&chain[2].id, &chain[0].id).unwrap();
        assert_eq!(diff.common_ancestor.as_ref(), Some(&chain[0].id));
        assert_eq!(diff.branch_only.len(), 2);
        assert!(diff.base_only.is_empty());
    }

    #[test]
    fn diff_of_unrelated_roots_has_no_ancestor() {
        let (repo, branches) = setup();
        let r1 = insert_chain(&repo, &["R1"]);
        let r2 = insert_chain(&repo, &["R2"]);

        let diff = branches.diff(&r1[0].id, &r2[0].id).unwrap();
        assert!(diff.common_ancestor.is_none());
        assert_eq!(diff.branch_only.len(), 1);
        assert_eq!(diff.base_only.len(), 1);
    }

    #[test]
    fn auto_merge_appends_under_clean_target() {
        let (repo, branches) = setup();
        let chain = insert_chain(&repo, &["R", "C1"]);
        let fork = branches.create_branch(&chain[0].id, "alt").unwrap();
        let fork_tip = repo
            .insert(&Entry::child_of(&fork.id, "branch work", "", Author::Ai("echo".into())))
            .unwrap();

        // C1 has no children: clean target.
        let outcome = branches
            .merge(&fork_tip.id, &chain[1].id, MergeStrategy::Auto)
            .unwrap();
        match outcome {
            MergeOutcome::Merged { entry } => {
                assert_eq!(entry.parent_id.as_ref(), Some(&chain[1].id));
                assert_eq!(entry.content, "branch work");
                assert_eq!(entry.author, Author::System("Merge".into()));
                assert_eq!(entry.meta_str(meta::MERGED_FROM), Some(fork_tip.id.as_str()));
            }
            other => panic!("expected Merged, got {other:?}"),
        }
    }

    #[test]
    fn auto_merge_conflicts_on_concurrent_children() {
        let (repo, branches) = setup();
        let chain = insert_chain(&repo, &["R", "C1", "C2"]);
        let fork = branches.create_branch(&chain[0].id, "alt").unwrap();

        // C1 already has C2 under it.
        let outcome = branches
            .merge(&fork.id, &chain[1].id, MergeStrategy::Auto)
            .unwrap();
        assert!(matches!(outcome, MergeOutcome::Conflict { .. }));
    }

    #[test]
    fn manual_merge_surfaces_divergence_without_writing() {
        let (repo, branches) = setup();
        let chain = insert_chain(&repo, &["R", "C1"]);
        let fork = branches.create_branch(&chain[0].id, "alt").unwrap();

        let before = repo.subtree(&chain[0].id).unwrap().len();
        let outcome = branches
            .merge(&fork.id, &chain[1].id, MergeStrategy::Manual)
            .unwrap();
        let after = repo.subtree(&chain[0].id).unwrap().len();

        assert_eq!(before, after, "manual merge must not append");
        match outcome {
            MergeOutcome::ManualReview { branch_only, base_only } => {
                assert_eq!(branch_only.len(), 1);
                assert_eq!(base_only.len(), 1);
            }
            other => panic!("expected ManualReview, got {other:?}"),
        }
    }

    #[test]
    fn rebase_replays_source_entries_in_order() {
        let (repo, branches) = setup();
        let chain = insert_chain(&repo, &["R", "C1"]);
        let fork = branches.create_branch(&chain[0].id, "alt").unwrap();
        let w1 = repo
            .insert(&Entry::child_of(&fork.id, "work 1", "", Author::Ai("echo".into())))
            .unwrap();
        let w2 = repo
            .insert(&Entry::child_of(&w1.id, "work 2", "", Author::Ai("echo".into())))
            .unwrap();

        let outcome = branches
            .merge(&w2.id, &chain[1].id, MergeStrategy::Rebase)
            .unwrap();
        let MergeOutcome::Rebased { new_tip, appended } = outcome else {
            panic!("expected Rebased");
        };

        assert_eq!(appended.len(), 3); // fork + work 1 + work 2
        let contents: Vec<_> = appended.iter().map(|e| e.content.clone()).collect();
        assert_eq!(contents, vec!["R", "work 1", "work 2"]);
        assert_eq!(appended.last().unwrap().id, new_tip);

        // The replayed copies chain off the target; originals untouched.
        let rebased_chain = repo.ancestor_chain(&new_tip).unwrap();
        assert_eq!(rebased_chain.len(), 5); // R, C1, 3 copies
        assert_eq!(
            appended[0].meta_str(meta::REBASED_FROM),
            Some(fork.id.as_str())
        );
        assert_eq!(repo.get(&w2.id).unwrap().parent_id.as_ref(), Some(&w1.id));
    }

    #[test]
    fn merge_strategy_parses() {
        assert_eq!("auto".parse::<MergeStrategy>().unwrap(), MergeStrategy::Auto);
        assert_eq!("rebase".parse::<MergeStrategy>().unwrap(), MergeStrategy::Rebase);
        assert!("squash".parse::<MergeStrategy>().is_err());
    }
}
