mod catalogue;
mod compiler;
mod factory;

pub use catalogue::{EntityTemplate, TemplateCatalogue, TemplateId};
pub use compiler::{
    compile_template_catalogue, parse_template_catalogue, CatalogueCompileError,
    CatalogueErrorCode, SourceLocation,
};
pub use factory::{
    CatalogueFactory, EntityFactory, SpawnContext, SpawnError, TemplateKeyResolver,
};
