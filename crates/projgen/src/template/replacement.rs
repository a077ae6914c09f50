use std::collections::BTreeMap;

use super::{PartId, Template, TokenId, TokenValue};
use crate::error::ProjgenError;

/// Handle to one replacement set inside a [`Replacements`] tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SetId(usize);

#[derive(Clone, Debug)]
struct ReplacementSet {
    part: PartId,
    parent: Option<SetId>,
    values: BTreeMap<TokenId, TokenValue>,
    children: BTreeMap<PartId, Vec<SetId>>,
}

/// Per-render values, mirroring the part tree of one template.
///
/// Every set belongs to exactly one part. Child sets are kept in registration order, which is
/// also their render order.
#[derive(Clone, Debug, Default)]
pub struct Replacements {
    sets: Vec<ReplacementSet>,
}

impl Replacements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a top-level set for the template's root part.
    pub fn root(&mut self, template: &Template) -> SetId {
        self.push(template.root(), None)
    }

    /// Creates and registers a set for `part`, which must be a direct child of the parent set's part.
    pub fn create(
        &mut self,
        template: &Template,
        part: PartId,
        parent: SetId,
    ) -> Result<SetId, ProjgenError> {
        let parent_part = self.part(parent);
        if template.parent(part) != Some(parent_part) {
            return Err(ProjgenError::UnknownTemplate {
                template: template.name().to_string(),
                name: template.part_name(part).to_string(),
            });
        }
        let id = self.push(part, Some(parent));
        self.sets[parent.0].children.entry(part).or_default().push(id);
        Ok(id)
    }

    /// Registers one more instance of the named sub-template beneath `parent`.
    pub fn instance(
        &mut self,
        template: &Template,
        parent: SetId,
        name: &str,
    ) -> Result<SetId, ProjgenError> {
        let part = template.child(self.part(parent), name)?;
        self.create(template, part, parent)
    }

    /// Assigns a token by name. Reassigning replaces the earlier value.
    pub fn assign(
        &mut self,
        template: &Template,
        set: SetId,
        name: &str,
        value: impl Into<TokenValue>,
    ) -> Result<(), ProjgenError> {
        let token = template.token(self.part(set), name)?;
        self.assign_token(template, set, token, value)
    }

    pub fn assign_token(
        &mut self,
        template: &Template,
        set: SetId,
        token: TokenId,
        value: impl Into<TokenValue>,
    ) -> Result<(), ProjgenError> {
        let part = self.part(set);
        if template.token_part(token) != part {
            return Err(ProjgenError::UnknownToken {
                template: template.name().to_string(),
                token: template.tokens[token.0].name.clone(),
            });
        }
        self.sets[set.0].values.insert(token, value.into());
        Ok(())
    }

    pub fn value(&self, set: SetId, token: TokenId) -> Option<&TokenValue> {
        self.sets[set.0].values.get(&token)
    }

    /// Sets registered for `part` beneath `set`, in registration order.
    pub fn instances(&self, set: SetId, part: PartId) -> &[SetId] {
        self.sets[set.0]
            .children
            .get(&part)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn part(&self, set: SetId) -> PartId {
        self.sets[set.0].part
    }

    pub fn parent(&self, set: SetId) -> Option<SetId> {
        self.sets[set.0].parent
    }

    fn push(&mut self, part: PartId, parent: Option<SetId>) -> SetId {
        let id = SetId(self.sets.len());
        self.sets.push(ReplacementSet {
            part,
            parent,
            values: BTreeMap::new(),
            children: BTreeMap::new(),
        });
        id
    }
}
