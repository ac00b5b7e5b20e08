use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};
use tracing::info;

use super::catalogue::{EntityTemplate, TemplateCatalogue, TemplateId};
use crate::world::BodyKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogueErrorCode {
    ReadFile,
    XmlMalformed,
    InvalidRoot,
    UnknownElement,
    UnknownField,
    DuplicateField,
    MissingField,
    InvalidValue,
    DuplicateKey,
}

#[derive(Debug, Clone)]
pub struct CatalogueCompileError {
    pub code: CatalogueErrorCode,
    pub message: String,
    pub file_path: PathBuf,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for CatalogueCompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (file={}, line={}, column={})",
                self.code,
                self.message,
                self.file_path.display(),
                loc.line,
                loc.column
            ),
            None => write!(
                f,
                "{:?}: {} (file={})",
                self.code,
                self.message,
                self.file_path.display()
            ),
        }
    }
}

impl std::error::Error for CatalogueCompileError {}

/// Reads a `<Templates>` document from disk.
pub fn compile_template_catalogue(path: &Path) -> Result<TemplateCatalogue, CatalogueCompileError> {
    let raw = fs::read_to_string(path).map_err(|source| CatalogueCompileError {
        code: CatalogueErrorCode::ReadFile,
        message: format!("failed to read XML file: {source}"),
        file_path: path.to_path_buf(),
        location: None,
    })?;
    let catalogue = parse_template_catalogue(path, &raw)?;
    info!(
        path = %path.display(),
        template_count = catalogue.len(),
        "template_catalogue_compiled"
    );
    Ok(catalogue)
}

/// Parses catalogue XML. `file_path` only labels errors.
pub fn parse_template_catalogue(
    file_path: &Path,
    raw: &str,
) -> Result<TemplateCatalogue, CatalogueCompileError> {
    let doc = Document::parse(raw).map_err(|error| CatalogueCompileError {
        code: CatalogueErrorCode::XmlMalformed,
        message: format!("malformed XML: {error}"),
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: error.pos().row as usize,
            column: error.pos().col as usize,
        }),
    })?;

    let root = doc.root_element();
    if root.tag_name().name() != "Templates" {
        return Err(error_at_node(
            CatalogueErrorCode::InvalidRoot,
            "root element must be <Templates>".to_string(),
            file_path,
            &doc,
            root,
        ));
    }

    let mut seen_keys = HashSet::<String>::new();
    let mut templates = Vec::new();
    for child in root.children().filter(|node| node.is_element()) {
        if child.tag_name().name() != "Template" {
            return Err(error_at_node(
                CatalogueErrorCode::UnknownElement,
                format!(
                    "unsupported element <{}>; expected <Template>",
                    child.tag_name().name()
                ),
                file_path,
                &doc,
                child,
            ));
        }
        let template = parse_template(file_path, &doc, child)?;
        if !seen_keys.insert(template.key.clone()) {
            return Err(error_at_node(
                CatalogueErrorCode::DuplicateKey,
                format!("duplicate template key '{}'", template.key),
                file_path,
                &doc,
                child,
            ));
        }
        templates.push(template);
    }

    Ok(TemplateCatalogue::from_templates(templates))
}

fn parse_template(
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
) -> Result<EntityTemplate, CatalogueCompileError> {
    let mut seen_fields = HashSet::<String>::new();
    let mut key: Option<String> = None;
    let mut body: Option<BodyKind> = None;
    let mut tags = Vec::<String>::new();

    for field in node.children().filter(|child| child.is_element()) {
        let field_name = field.tag_name().name().to_string();
        if !seen_fields.insert(field_name.clone()) {
            return Err(error_at_node(
                CatalogueErrorCode::DuplicateField,
                format!("duplicate field <{}> in <Template>", field_name),
                file_path,
                doc,
                field,
            ));
        }

        match field_name.as_str() {
            "key" => {
                key = Some(required_text(file_path, doc, field, "key")?);
            }
            "body" => {
                let value = required_text(file_path, doc, field, "body")?;
                let parsed = match value.as_str() {
                    "Dynamic" => BodyKind::Dynamic,
                    "Static" => BodyKind::Static,
                    "None" => BodyKind::None,
                    _ => {
                        return Err(error_at_node(
                            CatalogueErrorCode::InvalidValue,
                            format!(
                                "invalid body '{}'; allowed values: Dynamic, Static, None",
                                value
                            ),
                            file_path,
                            doc,
                            field,
                        ))
                    }
                };
                body = Some(parsed);
            }
            "tags" => {
                for item in field.children().filter(|child| child.is_element()) {
                    if item.tag_name().name() != "li" {
                        return Err(error_at_node(
                            CatalogueErrorCode::UnknownElement,
                            format!(
                                "<tags> entries must be <li>, found <{}>",
                                item.tag_name().name()
                            ),
                            file_path,
                            doc,
                            item,
                        ));
                    }
                    let tag = required_text(file_path, doc, item, "li")?;
                    if !tags.contains(&tag) {
                        tags.push(tag);
                    }
                }
            }
            _ => {
                return Err(error_at_node(
                    CatalogueErrorCode::UnknownField,
                    format!("unknown field <{}> in <Template>", field_name),
                    file_path,
                    doc,
                    field,
                ))
            }
        }
    }

    let Some(key) = key else {
        return Err(error_at_node(
            CatalogueErrorCode::MissingField,
            "missing required field <key> in <Template>".to_string(),
            file_path,
            doc,
            node,
        ));
    };

    Ok(EntityTemplate {
        id: TemplateId(0),
        key,
        body: body.unwrap_or(BodyKind::Dynamic),
        tags,
    })
}

fn required_text(
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
    field_name: &str,
) -> Result<String, CatalogueCompileError> {
    let value = node.text().map(str::trim).unwrap_or_default().to_string();
    if value.is_empty() {
        return Err(error_at_node(
            CatalogueErrorCode::MissingField,
            format!("field <{}> must not be empty", field_name),
            file_path,
            doc,
            node,
        ));
    }
    Ok(value)
}

fn error_at_node(
    code: CatalogueErrorCode,
    message: String,
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
) -> CatalogueCompileError {
    let pos = doc.text_pos_at(node.range().start);
    CatalogueCompileError {
        code,
        message,
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: pos.row as usize,
            column: pos.col as usize,
        }),
    }
}
