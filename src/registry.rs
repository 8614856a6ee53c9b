//! Named GraphQL documents, looked up by kind and name at call time
//!
//! On disk a registry is a folder with a `queries/` and a `mutations/`
//! directory. Every `.graphql` or `.gql` file in them is one document, named
//! after its file stem:
//!
//! ```text
//! graphql/
//! ├── queries/
//! │   ├── products.graphql
//! │   └── product.gql
//! └── mutations/
//!     └── addToCart.graphql
//! ```

use std::{collections::HashMap, fmt, fs, sync::Arc};

use apollo_parser::{Parser, cst};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::ArtemisError;

const EXTENSIONS: [&str; 2] = ["graphql", "gql"];

/// The two kinds of documents a registry holds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Query,
    Mutation,
}

impl OperationKind {
    /// The folder documents of this kind live in
    pub const fn folder(&self) -> &'static str {
        match self {
            OperationKind::Query => "queries",
            OperationKind::Mutation => "mutations",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Query => write!(f, "query"),
            OperationKind::Mutation => write!(f, "mutation"),
        }
    }
}

/// A parsed, executable document
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    source: Arc<str>,
    operation_name: Option<String>,
    kind: OperationKind,
}

impl Document {
    /// Parses `source`, taking the kind and name of its first operation.
    ///
    /// `origin` only labels errors.
    pub fn parse(origin: &Utf8Path, source: &str) -> Result<Document, ArtemisError> {
        let tree = Parser::new(source).parse();
        let errors = tree
            .errors()
            .map(|err| err.message().to_string())
            .collect::<Vec<_>>();
        if !errors.is_empty() {
            return Err(ArtemisError::InvalidDocument {
                path: origin.to_path_buf(),
                message: errors.join("; "),
            });
        }

        let operation = tree
            .document()
            .definitions()
            .find_map(|definition| match definition {
                cst::Definition::OperationDefinition(operation) => Some(operation),
                _ => None,
            })
            .ok_or_else(|| ArtemisError::NoOperation {
                path: origin.to_path_buf(),
            })?;

        let kind = match operation.operation_type() {
            // the `{ ... }` shorthand is a query
            None => OperationKind::Query,
            Some(operation_type) if operation_type.query_token().is_some() => {
                OperationKind::Query
            }
            Some(operation_type) if operation_type.mutation_token().is_some() => {
                OperationKind::Mutation
            }
            Some(_) => {
                return Err(ArtemisError::InvalidDocument {
                    path: origin.to_path_buf(),
                    message: "subscriptions are not supported".to_string(),
                })
            }
        };

        Ok(Document {
            source: Arc::from(source),
            operation_name: operation.name().map(|name| name.text().to_string()),
            kind,
        })
    }

    /// The full source, fragments included
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The name of the operation this document runs, if it has one
    pub fn operation_name(&self) -> Option<&str> {
        self.operation_name.as_deref()
    }

    pub const fn kind(&self) -> OperationKind {
        self.kind
    }
}

/// Documents by kind and name. Immutable once built.
#[derive(Clone, Debug, Default)]
pub struct DocumentRegistry {
    documents: HashMap<OperationKind, HashMap<String, Document>>,
}

impl DocumentRegistry {
    /// Starts an in-memory registry
    pub fn builder() -> DocumentRegistryBuilder {
        DocumentRegistryBuilder::default()
    }

    /// Loads every document under `folder`. A missing kind folder is an empty kind.
    pub fn from_folder(folder: &Utf8Path) -> Result<DocumentRegistry, ArtemisError> {
        let mut builder = DocumentRegistry::builder();
        for kind in [OperationKind::Query, OperationKind::Mutation] {
            let dir = folder.join(kind.folder());
            if !dir.is_dir() {
                tracing::debug!(%dir, "no {kind} documents");
                continue;
            }
            for path in document_files(&dir)? {
                let name = path.file_stem().unwrap_or_default().to_string();
                let source =
                    fs::read_to_string(&path).map_err(|source| ArtemisError::DocumentRead {
                        path: path.clone(),
                        source,
                    })?;
                let document = Document::parse(&path, &source)?;
                if document.kind != kind {
                    return Err(ArtemisError::KindMismatch {
                        path,
                        expected: kind,
                        found: document.kind,
                    });
                }
                tracing::trace!(%path, %name, "registered {kind}");
                builder = builder.insert(name, document)?;
            }
        }
        let registry = builder.build();
        tracing::info!(
            %folder,
            queries = registry.len(OperationKind::Query),
            mutations = registry.len(OperationKind::Mutation),
            "loaded documents"
        );
        Ok(registry)
    }

    pub fn get(&self, kind: OperationKind, name: &str) -> Option<&Document> {
        self.documents.get(&kind)?.get(name)
    }

    /// How many documents of `kind` are registered
    pub fn len(&self, kind: OperationKind) -> usize {
        self.documents.get(&kind).map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.documents.values().all(HashMap::is_empty)
    }

    /// Registered names of `kind`, sorted
    pub fn names(&self, kind: OperationKind) -> Vec<&str> {
        let mut names = self
            .documents
            .get(&kind)
            .map(|documents| documents.keys().map(String::as_str).collect::<Vec<_>>())
            .unwrap_or_default();
        names.sort_unstable();
        names
    }
}

fn document_files(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, ArtemisError> {
    let read_err = |source: std::io::Error| ArtemisError::DocumentRead {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in dir.read_dir_utf8().map_err(read_err)? {
        let path = entry.map_err(read_err)?.into_path();
        if path.is_file()
            && path
                .extension()
                .is_some_and(|extension| EXTENSIONS.contains(&extension))
        {
            files.push(path);
        }
    }
    // directory order is platform dependent; keep loading (and errors) stable
    files.sort();
    Ok(files)
}

/// Collects documents for a [`DocumentRegistry`], refusing duplicate names
#[derive(Debug, Default)]
pub struct DocumentRegistryBuilder {
    documents: HashMap<OperationKind, HashMap<String, Document>>,
}

impl DocumentRegistryBuilder {
    /// Registers `document` under `name`, filed by the document's own kind
    pub fn insert(
        mut self,
        name: impl Into<String>,
        document: Document,
    ) -> Result<DocumentRegistryBuilder, ArtemisError> {
        let name = name.into();
        let kind = document.kind;
        let documents = self.documents.entry(kind).or_default();
        if documents.contains_key(&name) {
            return Err(ArtemisError::DuplicateDocument { kind, name });
        }
        documents.insert(name, document);
        Ok(self)
    }

    /// Parses `source` and registers it under `name`
    pub fn source(
        self,
        name: impl Into<String>,
        source: &str,
    ) -> Result<DocumentRegistryBuilder, ArtemisError> {
        let name = name.into();
        let document = Document::parse(Utf8Path::new(&name), source)?;
        self.insert(name, document)
    }

    pub fn build(self) -> DocumentRegistry {
        DocumentRegistry {
            documents: self.documents,
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_fs::prelude::*;
    use camino::Utf8Path;
    use indoc::indoc;
    use rstest::rstest;
    use speculoos::prelude::*;

    use super::{Document, DocumentRegistry, OperationKind};
    use crate::ArtemisError;

    const PRODUCTS: &str = "query { products { id name } }";
    const PRODUCT: &str = indoc! {r#"
        query Product($id: Int!) {
          product(id: $id) { ...ProductFields }
        }

        fragment ProductFields on Product { id name }
    "#};
    const ADD_TO_CART: &str = "mutation AddToCart($id: Int!) { addToCart(id: $id) { id } }";

    #[rstest]
    #[case::shorthand("{ brands { id } }", OperationKind::Query, None)]
    #[case::anonymous(PRODUCTS, OperationKind::Query, None)]
    #[case::fragment_first(
        "fragment F on Brand { id }\nquery Brand { brand(id: 1) { ...F } }",
        OperationKind::Query,
        Some("Brand")
    )]
    #[case::named(PRODUCT, OperationKind::Query, Some("Product"))]
    #[case::mutation(ADD_TO_CART, OperationKind::Mutation, Some("AddToCart"))]
    fn it_reads_kind_and_operation_name(
        #[case] source: &str,
        #[case] kind: OperationKind,
        #[case] operation_name: Option<&str>,
    ) {
        let document = Document::parse(Utf8Path::new("test.graphql"), source).unwrap();
        assert_that!(document.kind()).is_equal_to(kind);
        assert_that!(document.operation_name()).is_equal_to(operation_name);
        assert_that!(document.source()).is_equal_to(source);
    }

    #[rstest]
    #[case::syntax("query { products { id }")]
    #[case::subscription("subscription { cartChanged { id } }")]
    fn it_rejects_unusable_documents(#[case] source: &str) {
        let result = Document::parse(Utf8Path::new("bad.graphql"), source);
        assert_that!(result)
            .is_err()
            .matches(|err| matches!(err, ArtemisError::InvalidDocument { .. }));
    }

    #[test]
    fn fragments_alone_are_not_documents() {
        let result = Document::parse(Utf8Path::new("f.graphql"), "fragment F on Brand { id }");
        assert_that!(result)
            .is_err()
            .matches(|err| matches!(err, ArtemisError::NoOperation { .. }));
    }

    #[test]
    fn it_loads_a_folder() {
        let dir = assert_fs::TempDir::new().unwrap();
        dir.child("queries/products.graphql").write_str(PRODUCTS).unwrap();
        dir.child("queries/product.gql").write_str(PRODUCT).unwrap();
        dir.child("queries/README.md").write_str("# not a document").unwrap();
        dir.child("mutations/addToCart.graphql")
            .write_str(ADD_TO_CART)
            .unwrap();

        let registry =
            DocumentRegistry::from_folder(Utf8Path::from_path(dir.path()).unwrap()).unwrap();

        assert_that!(registry.names(OperationKind::Query)).is_equal_to(vec!["product", "products"]);
        assert_that!(registry.names(OperationKind::Mutation)).is_equal_to(vec!["addToCart"]);
        assert_that!(registry.get(OperationKind::Query, "product"))
            .is_some()
            .matches(|document| document.operation_name() == Some("Product"));
        assert_that!(registry.get(OperationKind::Mutation, "products")).is_none();
    }

    #[test]
    fn missing_kind_folders_are_empty() {
        let dir = assert_fs::TempDir::new().unwrap();
        dir.child("queries/products.graphql").write_str(PRODUCTS).unwrap();

        let registry =
            DocumentRegistry::from_folder(Utf8Path::from_path(dir.path()).unwrap()).unwrap();

        assert_that!(registry.len(OperationKind::Query)).is_equal_to(1);
        assert_that!(registry.len(OperationKind::Mutation)).is_equal_to(0);
    }

    #[test]
    fn documents_must_match_their_folder() {
        let dir = assert_fs::TempDir::new().unwrap();
        dir.child("queries/addToCart.graphql").write_str(ADD_TO_CART).unwrap();

        let result = DocumentRegistry::from_folder(Utf8Path::from_path(dir.path()).unwrap());

        assert_that!(result).is_err().matches(|err| {
            matches!(
                err,
                ArtemisError::KindMismatch {
                    expected: OperationKind::Query,
                    found: OperationKind::Mutation,
                    ..
                }
            )
        });
    }

    #[test]
    fn names_are_unique_per_kind() {
        let dir = assert_fs::TempDir::new().unwrap();
        dir.child("queries/products.graphql").write_str(PRODUCTS).unwrap();
        dir.child("queries/products.gql").write_str(PRODUCTS).unwrap();

        let result = DocumentRegistry::from_folder(Utf8Path::from_path(dir.path()).unwrap());

        assert_that!(result).is_err().matches(|err| {
            matches!(err, ArtemisError::DuplicateDocument { name, .. } if name == "products")
        });
    }

    #[test]
    fn the_same_name_may_exist_for_both_kinds() {
        let registry = DocumentRegistry::builder()
            .source("cart", "query Cart { cart { id } }")
            .and_then(|builder| builder.source("cart", "mutation Cart { clearCart { id } }"))
            .unwrap()
            .build();

        assert_that!(registry.get(OperationKind::Query, "cart")).is_some();
        assert_that!(registry.get(OperationKind::Mutation, "cart")).is_some();
        assert_that!(registry.is_empty()).is_false();
    }
}
