use std::collections::HashMap;

use crate::world::BodyKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TemplateId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub struct EntityTemplate {
    pub id: TemplateId,
    pub key: String,
    pub body: BodyKind,
    pub tags: Vec<String>,
}

impl EntityTemplate {
    pub fn new(key: impl Into<String>, body: BodyKind) -> Self {
        Self {
            id: TemplateId(0),
            key: key.into(),
            body,
            tags: Vec::new(),
        }
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Templates available for instantiation, addressable by key or position.
#[derive(Debug, Default, Clone)]
pub struct TemplateCatalogue {
    templates: Vec<EntityTemplate>,
    ids_by_key: HashMap<String, TemplateId>,
}

impl TemplateCatalogue {
    /// Ids are reassigned by position. When keys repeat, the first template
    /// answers key lookups.
    pub fn from_templates(mut templates: Vec<EntityTemplate>) -> Self {
        let mut ids_by_key = HashMap::with_capacity(templates.len());
        for (idx, template) in templates.iter_mut().enumerate() {
            let id = TemplateId(idx as u32);
            template.id = id;
            ids_by_key.entry(template.key.clone()).or_insert(id);
        }
        Self {
            templates,
            ids_by_key,
        }
    }

    pub fn template_id_by_key(&self, key: &str) -> Option<TemplateId> {
        self.ids_by_key.get(key).copied()
    }

    pub fn template_by_key(&self, key: &str) -> Option<&EntityTemplate> {
        self.template_id_by_key(key)
            .and_then(|id| self.template(id))
    }

    pub fn template(&self, id: TemplateId) -> Option<&EntityTemplate> {
        self.templates.get(id.0 as usize)
    }

    pub fn templates(&self) -> &[EntityTemplate] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
