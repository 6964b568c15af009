//! Operation tables extracted from WSDL contracts

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use tracing::debug;

use crate::errors::SoapError;

/// What the transport needs to know about a WSDL contract: its target
/// namespace, the operations it declares with their SOAP actions, and the
/// schema elements declared as repeatable (`maxOccurs` above one).
///
/// Parsing is the expensive part of building a service client; a parsed
/// document is shared between a template transport and all its clones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsdlDocument {
    path: PathBuf,
    target_namespace: String,
    operations: BTreeMap<String, Option<String>>,
    list_elements: BTreeSet<String>,
}

#[derive(Default)]
struct ParseState {
    depth: usize,
    target_namespace: Option<String>,
    port_type_depth: Option<usize>,
    binding_depth: Option<usize>,
    binding_operation: Option<(String, usize)>,
    operations: BTreeMap<String, Option<String>>,
    list_elements: BTreeSet<String>,
}

fn attribute(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.try_get_attribute(name)
        .ok()
        .flatten()
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

fn repeatable(max_occurs: &str) -> bool {
    max_occurs == "unbounded" || max_occurs.parse::<u32>().is_ok_and(|n| n > 1)
}

impl ParseState {
    /// Handles an element opening at `depth` (root is 1)
    fn open(&mut self, e: &BytesStart<'_>, depth: usize) -> Result<(), String> {
        let local = e.local_name();
        match (local.as_ref(), depth) {
            (b"definitions", 1) => {
                self.target_namespace = attribute(e, "targetNamespace");
            }
            (_, 1) => {
                return Err(format!(
                    "root element is <{}>, not <definitions>",
                    String::from_utf8_lossy(local.as_ref())
                ));
            }
            (b"portType", 2) => self.port_type_depth = Some(depth),
            (b"binding", 2) => self.binding_depth = Some(depth),
            (b"element", _) => {
                if let (Some(name), Some(max)) = (attribute(e, "name"), attribute(e, "maxOccurs")) {
                    if repeatable(&max) {
                        self.list_elements.insert(name);
                    }
                }
            }
            (b"operation", _) => {
                if self.port_type_depth.is_some_and(|p| depth == p + 1) {
                    if let Some(name) = attribute(e, "name") {
                        self.operations.entry(name).or_insert(None);
                    }
                } else if self.binding_depth.is_some_and(|b| depth == b + 1) {
                    if let Some(name) = attribute(e, "name") {
                        self.binding_operation = Some((name, depth));
                    }
                } else if let Some((name, op_depth)) = &self.binding_operation {
                    if depth == op_depth + 1 {
                        if let Some(action) = attribute(e, "soapAction") {
                            self.operations.insert(name.clone(), Some(action));
                        }
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self, depth: usize) {
        if self.port_type_depth == Some(depth) {
            self.port_type_depth = None;
        }
        if self.binding_depth == Some(depth) {
            self.binding_depth = None;
        }
        if self
            .binding_operation
            .as_ref()
            .is_some_and(|(_, d)| *d == depth)
        {
            self.binding_operation = None;
        }
    }
}

impl WsdlDocument {
    /// Builds a document from an explicit operation list
    pub fn new<I, S>(path: impl Into<PathBuf>, target_namespace: &str, operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into(),
            target_namespace: target_namespace.to_string(),
            operations: operations.into_iter().map(|o| (o.into(), None)).collect(),
            list_elements: BTreeSet::new(),
        }
    }

    /// Declares element names that always decode as sequences
    pub fn with_list_elements<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.list_elements.extend(names.into_iter().map(Into::into));
        self
    }

    /// Reads and parses a WSDL file
    pub fn parse_file(path: &Path) -> Result<Self, SoapError> {
        let data = fs::read(path).map_err(|e| SoapError::wsdl(path, e))?;
        Self::parse(path, &data)
    }

    /// Parses WSDL content read from `path`
    pub fn parse(path: &Path, xml: &[u8]) -> Result<Self, SoapError> {
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        let mut state = ParseState::default();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    state.depth += 1;
                    state
                        .open(&e, state.depth)
                        .map_err(|m| SoapError::wsdl(path, m))?;
                }
                Ok(Event::Empty(e)) => {
                    let depth = state.depth + 1;
                    state.open(&e, depth).map_err(|m| SoapError::wsdl(path, m))?;
                    state.close(depth);
                }
                Ok(Event::End(_)) => {
                    state.close(state.depth);
                    state.depth = state.depth.saturating_sub(1);
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(SoapError::wsdl(path, e)),
                _ => {}
            }
            buf.clear();
        }

        let target_namespace = state
            .target_namespace
            .ok_or_else(|| SoapError::wsdl(path, "missing targetNamespace"))?;

        debug!(
            wsdl = %path.display(),
            namespace = %target_namespace,
            operations = state.operations.len(),
            lists = state.list_elements.len(),
            "Parsed WSDL document"
        );

        Ok(Self {
            path: path.to_path_buf(),
            target_namespace,
            operations: state.operations,
            list_elements: state.list_elements,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn target_namespace(&self) -> &str {
        &self.target_namespace
    }

    pub fn has_operation(&self, operation: &str) -> bool {
        self.operations.contains_key(operation)
    }

    /// Declared operation names, sorted
    pub fn operations(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(String::as_str)
    }

    /// Whether elements named `name` are declared as repeatable
    pub fn is_list_element(&self, name: &str) -> bool {
        self.list_elements.contains(name)
    }

    /// SOAP action of an operation, defaulting to `<namespace>/<operation>`
    pub fn soap_action(&self, operation: &str) -> Option<String> {
        self.operations.get(operation).map(|action| {
            action
                .clone()
                .unwrap_or_else(|| format!("{}/{}", self.target_namespace, operation))
        })
    }
}
