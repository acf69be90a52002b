//! Turning a CF-tree into a flat clustering.

use std::collections::BTreeMap;

use arbor::dbid::DBID;
use arbor::errors::{ArborError, ArborResult, ErrorKind};
use arbor::relation::Relation;

use crate::features::ClusterFeature;
use crate::tree::{CFTree, LeafId};

/// The objects assigned to one leaf feature.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafCluster {
    pub leaf: LeafId,
    pub members: Vec<DBID>,
}

/// Assigns every object of the relation to the leaf it is routed to.
///
/// Clusters come out in leaf order, members in relation order. Leaves that
/// attract no object produce no cluster.
pub fn leaf_clustering<F: ClusterFeature>(
    tree: &CFTree<F>,
    relation: &dyn Relation<Object = [f64]>,
) -> ArborResult<Vec<LeafCluster>> {
    let mut clusters: BTreeMap<LeafId, Vec<DBID>> = BTreeMap::new();
    for id in relation.dbids() {
        let point = relation
            .get(id)
            .ok_or_else(|| ArborError::new(&format!("object {} vanished from the relation", id), ErrorKind::NotFound))?;
        let leaf = tree.find_leaf(&point)?;
        clusters.entry(leaf).or_default().push(id);
    }
    log::debug!(
        "Assigned {} objects to {} of {} leaves",
        relation.size(),
        clusters.len(),
        tree.leaf_count()
    );
    Ok(clusters
        .into_iter()
        .map(|(leaf, members)| LeafCluster { leaf, members })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CFTreeConfig, MaxLeaves};
    use arbor::relation::VectorRelation;

    #[test]
    fn test_two_groups() {
        let mut vectors = Vec::new();
        for i in 0..5 {
            vectors.push(vec![i as f64 * 0.1, 0.0]);
            vectors.push(vec![50.0 + i as f64 * 0.1, 0.0]);
        }
        let relation = VectorRelation::from_vectors(vectors).unwrap();
        let config = CFTreeConfig::new()
            .with_threshold(1.0)
            .with_max_leaves(MaxLeaves::Absolute(10));
        let tree: CFTree = CFTree::build(&relation, config).unwrap();

        let clusters = leaf_clustering(&tree, &relation).unwrap();
        assert_eq!(clusters.len(), 2);
        let even: Vec<DBID> = (0..5).map(|i| DBID::new(2 * i)).collect();
        let odd: Vec<DBID> = (0..5).map(|i| DBID::new(2 * i + 1)).collect();
        let members: Vec<&Vec<DBID>> = clusters.iter().map(|c| &c.members).collect();
        assert!(members.contains(&&even));
        assert!(members.contains(&&odd));
    }

    #[test]
    fn test_empty_tree_fails() {
        let relation = VectorRelation::from_vectors(vec![vec![0.0]]).unwrap();
        let tree: CFTree = CFTree::new(CFTreeConfig::new(), 1).unwrap();
        let err = leaf_clustering(&tree, &relation).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidOperation);
    }
}
