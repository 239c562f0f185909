//! The view-module language: a small markup dialect compiled into execution units.
//!
//! ```text
//! // header.js
//! import Spinner from "extern:loading"
//! export default <header class="top">
//!   <h1>{title}</h1>
//!   <Spinner message={status.text} />
//! </header>
//! ```
//!
//! Capitalised tags are components and must be imported. Everything else is
//! an element built through the [`ViewLibrary`].

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use extern_core::errors::{CompileError, ExecutionError, RenderError};
use extern_core::view::{Component, Node, Props};

use super::library::ViewLibrary;
use super::{Capabilities, ExecutionUnit, ModuleCompiler};

/// `import <name> from "<specifier>"`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Import {
    pub name: String,
    pub specifier: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttrValue {
    Literal(String),
    Path(Vec<String>),
    /// Bare attribute, `true` when passed to a component.
    Flag,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: AttrValue,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Markup {
    Element {
        tag: String,
        attributes: Vec<Attribute>,
        children: Vec<Markup>,
    },
    Text(String),
    Interpolation(Vec<String>),
}

/// A parsed view module.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TemplateModule {
    pub imports: Vec<Import>,
    pub export: Option<Markup>,
}

impl TemplateModule {
    pub fn parse(pathname: &str, source: &str) -> Result<Self, CompileError> {
        Parser::new(pathname, source).program()
    }
}

fn is_component_tag(tag: &str) -> bool {
    tag.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')
}

/// Position-tracking cursor over module source.
#[derive(Clone, Debug)]
struct Cursor<'a> {
    src: &'a str,
    offset: usize,
    line: usize,
    column: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.offset..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        self.offset += ch.len_utf8();
        Some(ch)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume_while(&mut self, mut predicate: impl FnMut(char) -> bool) -> &'a str {
        let start = self.offset;
        while let Some(ch) = self.peek() {
            if !predicate(ch) {
                break;
            }
            self.advance();
        }
        &self.src[start..self.offset]
    }
}

/// Deepest element nesting a module may use.
pub const MAX_DEPTH: usize = 256;

struct Parser<'a> {
    pathname: &'a str,
    cursor: Cursor<'a>,
    /// Component tags seen while parsing, checked against the imports at the end.
    used_components: Vec<(String, usize, usize)>,
    /// Elements currently open.
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(pathname: &'a str, source: &'a str) -> Self {
        Self {
            pathname,
            cursor: Cursor::new(source),
            used_components: Vec::new(),
            depth: 0,
        }
    }

    fn error_at(&self, line: usize, column: usize, message: impl Into<String>) -> CompileError {
        CompileError {
            pathname: self.pathname.to_string(),
            line,
            column,
            message: message.into(),
        }
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        self.error_at(self.cursor.line, self.cursor.column, message)
    }

    fn unexpected(&self, expected: &str) -> CompileError {
        match self.cursor.peek() {
            Some(c) => self.error(format!("unexpected {c:?}, expected {expected}")),
            None => self.error(format!("unexpected end of input, expected {expected}")),
        }
    }

    fn expect(&mut self, ch: char) -> Result<(), CompileError> {
        if self.cursor.eat(ch) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("{ch:?}")))
        }
    }

    fn skip_ws(&mut self) {
        self.cursor.consume_while(char::is_whitespace);
    }

    /// Whitespace and line comments.
    fn skip_trivia(&mut self) {
        loop {
            self.skip_ws();
            if self.cursor.rest().starts_with("//") {
                self.cursor.consume_while(|c| c != '\n');
            } else {
                break;
            }
        }
    }

    fn ident(&mut self) -> Result<&'a str, CompileError> {
        match self.cursor.peek() {
            Some(c) if is_ident_start(c) => Ok(self.cursor.consume_while(is_ident_char)),
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn name(&mut self) -> Result<&'a str, CompileError> {
        match self.cursor.peek() {
            Some(c) if is_ident_start(c) => Ok(self.cursor.consume_while(is_name_char)),
            _ => Err(self.unexpected("name")),
        }
    }

    /// Consume `keyword` if it is the next identifier.
    fn keyword(&mut self, keyword: &str) -> bool {
        let saved = self.cursor.clone();
        match self.ident() {
            Ok(word) if word == keyword => true,
            _ => {
                self.cursor = saved;
                false
            }
        }
    }

    fn string(&mut self) -> Result<String, CompileError> {
        let quote = match self.cursor.peek() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(self.unexpected("string")),
        };
        let (line, column) = (self.cursor.line, self.cursor.column);
        self.cursor.advance();

        let mut out = String::new();
        loop {
            match self.cursor.advance() {
                Some(c) if c == quote => return Ok(out),
                Some('\\') => match self.cursor.advance() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(c) => out.push(c),
                    None => break,
                },
                Some('\n') | None => break,
                Some(c) => out.push(c),
            }
        }
        Err(self.error_at(line, column, "unterminated string"))
    }

    fn path(&mut self) -> Result<Vec<String>, CompileError> {
        let mut segments = vec![self.ident()?.to_string()];
        while self.cursor.eat('.') {
            segments.push(self.ident()?.to_string());
        }
        Ok(segments)
    }

    /// `{ path }`, opening brace already consumed.
    fn braced_path(&mut self) -> Result<Vec<String>, CompileError> {
        self.skip_ws();
        let path = self.path()?;
        self.skip_ws();
        self.expect('}')?;
        Ok(path)
    }

    fn program(mut self) -> Result<TemplateModule, CompileError> {
        let mut module = TemplateModule::default();

        loop {
            self.skip_trivia();
            if self.cursor.peek().is_none() {
                break;
            }
            let (line, column) = (self.cursor.line, self.cursor.column);
            match self.ident()? {
                "import" => {
                    self.skip_ws();
                    let name = self.ident()?.to_string();
                    self.skip_ws();
                    if !self.keyword("from") {
                        return Err(self.unexpected("`from`"));
                    }
                    self.skip_ws();
                    let specifier = self.string()?;
                    if module.imports.iter().any(|i| i.name == name) {
                        return Err(self.error_at(line, column, format!("`{name}` is imported twice")));
                    }
                    module.imports.push(Import { name, specifier });
                }
                "export" => {
                    self.skip_ws();
                    self.keyword("default");
                    self.skip_ws();
                    let markup = self.markup()?;
                    if module.export.is_some() {
                        return Err(self.error_at(line, column, "module exports more than once"));
                    }
                    module.export = Some(markup);
                }
                other => {
                    return Err(self.error_at(
                        line,
                        column,
                        format!("unexpected `{other}`, expected `import` or `export`"),
                    ))
                }
            }
            self.skip_ws();
            self.cursor.eat(';');
        }

        for (tag, line, column) in &self.used_components {
            if !module.imports.iter().any(|i| &i.name == tag) {
                return Err(self.error_at(*line, *column, format!("component `{tag}` is not imported")));
            }
        }
        Ok(module)
    }

    /// One element. Nesting is capped so rendering and serialization, which
    /// recurse over the tree, stay within the stack.
    fn markup(&mut self) -> Result<Markup, CompileError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error(format!("markup nested deeper than {MAX_DEPTH} levels")));
        }
        self.depth += 1;
        let markup = self.element();
        self.depth -= 1;
        markup
    }

    fn element(&mut self) -> Result<Markup, CompileError> {
        let (line, column) = (self.cursor.line, self.cursor.column);
        self.expect('<')?;
        let tag = self.name()?.to_string();

        let mut attributes = Vec::new();
        let self_closing = loop {
            self.skip_ws();
            match self.cursor.peek() {
                Some('/') => {
                    self.cursor.advance();
                    self.expect('>')?;
                    break true;
                }
                Some('>') => {
                    self.cursor.advance();
                    break false;
                }
                Some(c) if is_ident_start(c) => attributes.push(self.attribute()?),
                _ => return Err(self.unexpected("attribute, `>` or `/>`")),
            }
        };

        let children = if self_closing { Vec::new() } else { self.children(&tag)? };

        if is_component_tag(&tag) {
            if !children.is_empty() {
                return Err(self.error_at(line, column, format!("component `{tag}` cannot have children")));
            }
            self.used_components.push((tag.clone(), line, column));
        }

        Ok(Markup::Element {
            tag,
            attributes,
            children,
        })
    }

    fn attribute(&mut self) -> Result<Attribute, CompileError> {
        let name = self.name()?.to_string();
        self.skip_ws();
        if !self.cursor.eat('=') {
            return Ok(Attribute {
                name,
                value: AttrValue::Flag,
            });
        }
        self.skip_ws();
        let value = match self.cursor.peek() {
            Some('"' | '\'') => AttrValue::Literal(self.string()?),
            Some('{') => {
                self.cursor.advance();
                AttrValue::Path(self.braced_path()?)
            }
            _ => return Err(self.unexpected("string or `{`")),
        };
        Ok(Attribute { name, value })
    }

    fn children(&mut self, tag: &str) -> Result<Vec<Markup>, CompileError> {
        let mut children = Vec::new();
        let mut text = String::new();

        loop {
            match self.cursor.peek() {
                None => return Err(self.error(format!("unclosed <{tag}>"))),
                Some('<') => {
                    push_text(&mut children, &mut text);
                    if self.cursor.rest().starts_with("</") {
                        self.cursor.advance();
                        self.cursor.advance();
                        self.skip_ws();
                        let close = self.name()?;
                        if close != tag {
                            return Err(self.error(format!("expected </{tag}>, found </{close}>")));
                        }
                        self.skip_ws();
                        self.expect('>')?;
                        return Ok(children);
                    }
                    children.push(self.markup()?);
                }
                Some('{') => {
                    push_text(&mut children, &mut text);
                    self.cursor.advance();
                    children.push(Markup::Interpolation(self.braced_path()?));
                }
                Some(c) => {
                    text.push(c);
                    self.cursor.advance();
                }
            }
        }
    }
}

/// Text on a single line is kept verbatim; multi-line text is collapsed the way
/// JSX does it, joining the non-blank lines with a single space.
fn push_text(children: &mut Vec<Markup>, text: &mut String) {
    let raw = std::mem::take(text);
    let normalized = if raw.contains('\n') {
        raw.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        raw
    };
    if !normalized.is_empty() {
        children.push(Markup::Text(normalized));
    }
}

fn lookup<'v>(props: &'v Props, path: &[String]) -> Option<&'v Value> {
    let (first, rest) = path.split_first()?;
    let mut value = props.get(first)?;
    for segment in rest {
        value = match value {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(value)
}

fn display(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Compiled form of a module that has not run yet.
struct TemplateUnit {
    pathname: String,
    module: TemplateModule,
}

impl ExecutionUnit for TemplateUnit {
    fn execute(&self, capabilities: &Capabilities) -> Result<Arc<dyn Component>, ExecutionError> {
        let mut components = HashMap::new();
        for import in &self.module.imports {
            let component = capabilities.resolver.resolve(&import.specifier).ok_or_else(|| {
                ExecutionError::UnresolvedImport {
                    pathname: self.pathname.clone(),
                    specifier: import.specifier.clone(),
                }
            })?;
            components.insert(import.name.clone(), component);
        }

        let root = self.module.export.clone().ok_or_else(|| ExecutionError::NoExport {
            pathname: self.pathname.clone(),
        })?;

        Ok(Arc::new(TemplateComponent {
            name: self.pathname.clone(),
            root,
            components,
            library: capabilities.library,
        }))
    }
}

/// The component a view module evaluates to.
pub struct TemplateComponent {
    name: String,
    root: Markup,
    components: HashMap<String, Arc<dyn Component>>,
    library: ViewLibrary,
}

impl TemplateComponent {
    fn render_markup(&self, markup: &Markup, props: &Props) -> Result<Node, RenderError> {
        match markup {
            Markup::Text(text) => Ok(self.library.text(text.clone())),
            Markup::Interpolation(path) => Ok(self.library.text(display(lookup(props, path)))),
            Markup::Element { tag, attributes, .. } if is_component_tag(tag) => {
                let component = self.components.get(tag).ok_or_else(|| ExecutionError::UnresolvedImport {
                    pathname: self.name.clone(),
                    specifier: tag.clone(),
                })?;
                let mut component_props = Props::new();
                for attr in attributes {
                    let value = match &attr.value {
                        AttrValue::Literal(s) => Value::String(s.clone()),
                        AttrValue::Path(path) => lookup(props, path).cloned().unwrap_or(Value::Null),
                        AttrValue::Flag => Value::Bool(true),
                    };
                    component_props.insert(attr.name.clone(), value);
                }
                component.render(&component_props)
            }
            Markup::Element {
                tag,
                attributes,
                children,
            } => {
                let attributes = attributes
                    .iter()
                    .map(|attr| {
                        let value = match &attr.value {
                            AttrValue::Literal(s) => s.clone(),
                            AttrValue::Path(path) => display(lookup(props, path)),
                            AttrValue::Flag => String::new(),
                        };
                        (attr.name.clone(), value)
                    })
                    .collect();
                let children = children
                    .iter()
                    .map(|child| self.render_markup(child, props))
                    .collect::<Result<Vec<_>, _>>()?;
                self.library.element(tag, attributes, children)
            }
        }
    }
}

impl Component for TemplateComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn render(&self, props: &Props) -> Result<Node, RenderError> {
        self.render_markup(&self.root, props)
    }
}

/// Default [`ModuleCompiler`]: parses the view-module language.
#[derive(Clone, Copy, Debug, Default)]
pub struct TemplateCompiler;

impl ModuleCompiler for TemplateCompiler {
    fn compile(&self, pathname: &str, source: &str) -> Result<Arc<dyn ExecutionUnit>, CompileError> {
        let module = TemplateModule::parse(pathname, source)?;
        Ok(Arc::new(TemplateUnit {
            pathname: pathname.to_string(),
            module,
        }))
    }
}
