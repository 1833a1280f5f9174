//! Outcome of one export or sync pass.

use std::fmt;

use tether_core::EntityId;

use crate::kind::PrimitiveKind;

/// Which engine step an entity failed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Export,
    Update,
    DeformSample,
    Instance,
    Retype,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Export => "export",
            Operation::Update => "update",
            Operation::DeformSample => "deform sample",
            Operation::Instance => "instance",
            Operation::Retype => "retype",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// A failure confined to one entity.
#[derive(Clone, Debug, PartialEq)]
pub struct EntityError {
    pub entity: EntityId,
    pub name: String,
    pub kind: Option<PrimitiveKind>,
    pub operation: Operation,
    pub message: String,
}

impl fmt::Display for EntityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Some(kind) => write!(
                f,
                "{} '{}' ({}): {} failed: {}",
                kind, self.name, self.entity, self.operation, self.message
            ),
            None => write!(
                f,
                "'{}' ({}): {} failed: {}",
                self.name, self.entity, self.operation, self.message
            ),
        }
    }
}

/// Summary of what a pass did to the renderer scene.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyncReport {
    /// Entities that got a new renderer node
    pub exported: Vec<EntityId>,
    /// Entities re-translated in place
    pub updated: Vec<EntityId>,
    /// Entities whose instances were torn down by the delete pass
    pub deleted: Vec<EntityId>,
    pub instances_created: usize,
    pub instances_removed: usize,
    /// Structural skips (translator declined the entity)
    pub skipped: usize,
    pub errors: Vec<EntityError>,
}

impl SyncReport {
    pub fn record_error(
        &mut self,
        entity: EntityId,
        name: &str,
        kind: Option<PrimitiveKind>,
        operation: Operation,
        message: impl Into<String>,
    ) {
        let error = EntityError {
            entity,
            name: name.to_string(),
            kind,
            operation,
            message: message.into(),
        };
        log::error!("{}", error);
        self.errors.push(error);
    }

    pub fn was_updated(&self, id: EntityId) -> bool {
        self.updated.contains(&id)
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: SyncReport) {
        self.exported.extend(other.exported);
        self.updated.extend(other.updated);
        self.deleted.extend(other.deleted);
        self.instances_created += other.instances_created;
        self.instances_removed += other.instances_removed;
        self.skipped += other.skipped;
        self.errors.extend(other.errors);
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} exported, {} updated, {} deleted, {} instances created, {} removed, {} skipped, {} errors",
            self.exported.len(),
            self.updated.len(),
            self.deleted.len(),
            self.instances_created,
            self.instances_removed,
            self.skipped,
            self.errors.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_error_display() {
        let mut report = SyncReport::default();
        report.record_error(
            EntityId(4),
            "Cube",
            Some(PrimitiveKind::Mesh),
            Operation::Retype,
            "Changing primitive type is currently not supported.",
        );
        assert!(!report.is_clean());
        assert_eq!(
            report.errors[0].to_string(),
            "MESH 'Cube' (4): retype failed: Changing primitive type is currently not supported."
        );
    }

    #[test]
    fn test_merge() {
        let mut a = SyncReport {
            instances_created: 2,
            ..Default::default()
        };
        a.updated.push(EntityId(1));
        let mut b = SyncReport {
            instances_created: 1,
            skipped: 3,
            ..Default::default()
        };
        b.updated.push(EntityId(2));
        a.merge(b);
        assert_eq!(a.instances_created, 3);
        assert_eq!(a.skipped, 3);
        assert!(a.was_updated(EntityId(2)));
    }
}
