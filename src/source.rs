//! Type declarations read from Rust source files.
//!
//! [`SourceScanner`] walks a project directory, parses every `.rs` file with `syn`
//! and turns `struct`, `enum` and `type` items into [`TypeDecl`]s. Serde attributes
//! are honoured where they change the wire shape: `rename`, `rename_all`, `skip`,
//! `deny_unknown_fields`, `tag` and `untagged`.
//!
//! Type paths inside a declaration are resolved the way the compiler would see
//! them from the declaring module: `crate::`, `self::` and `super::` are anchored,
//! `use` imports are followed, and a bare name prefers a declaration in the same
//! module. Names that resolve to nothing scanned are kept as written.

use crate::catalog::{DeclBody, DiscriminatorDecl, FieldDecl, TypeDecl};
use crate::type_expr::TypeExpr;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use syn::meta::ParseNestedMeta;
use syn::visit::Visit;
use walkdir::WalkDir;

/// Recursively collects `.rs` files under a root directory.
///
/// `target` and hidden directories are skipped. Files are returned in a stable,
/// name-sorted order so that declarations are registered deterministically.
pub struct SourceScanner {
    root_path: PathBuf,
}

/// Result of a directory scan.
pub struct ScanResult {
    /// Paths to all discovered `.rs` files
    pub rust_files: Vec<PathBuf>,
    /// Inaccessible entries, one message each
    pub warnings: Vec<String>,
}

/// Declarations loaded from one source tree.
#[derive(Debug, Default)]
pub struct SourceTypes {
    /// Declarations in file order, then source order within a file
    pub decls: Vec<TypeDecl>,
    /// `.rs` files found under the root
    pub files_scanned: usize,
    /// Files that parsed; the rest were skipped with a warning
    pub files_parsed: usize,
}

impl SourceScanner {
    /// Create a scanner rooted at a project directory.
    pub fn new(root_path: PathBuf) -> Self {
        Self { root_path }
    }

    /// Find every `.rs` file under the root.
    pub fn scan(&self) -> Result<ScanResult> {
        if !self.root_path.is_dir() {
            anyhow::bail!("Source path is not a directory: {}", self.root_path.display());
        }

        let mut rust_files = Vec::new();
        let mut warnings = Vec::new();

        for entry in WalkDir::new(&self.root_path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                if e.depth() == 0 {
                    return true;
                }
                let file_name = e.file_name().to_string_lossy();
                !file_name.starts_with('.') && file_name != "target"
            })
        {
            match entry {
                Ok(entry) => {
                    let path = entry.path();
                    if entry.file_type().is_file()
                        && path.extension().and_then(|s| s.to_str()) == Some("rs")
                    {
                        rust_files.push(path.to_path_buf());
                    }
                }
                Err(e) => {
                    let warning = format!("Failed to access path: {}", e);
                    warn!("{}", warning);
                    warnings.push(warning);
                }
            }
        }

        Ok(ScanResult {
            rust_files,
            warnings,
        })
    }

    /// Scan, parse and collect every declaration under the root.
    ///
    /// Files that fail to parse are skipped with a warning.
    pub fn load(&self) -> Result<SourceTypes> {
        let scan = self.scan()?;
        info!(
            "Found {} Rust file(s) under {}",
            scan.rust_files.len(),
            self.root_path.display()
        );

        let mut parsed = Vec::new();
        for path in &scan.rust_files {
            match parse_file(path) {
                Ok(file) => parsed.push((module_path(&self.root_path, path), file)),
                Err(e) => warn!("Skipping {}: {:#}", path.display(), e),
            }
        }

        // Paths resolve against every declaration in the tree, not just their own file
        let mut declared = HashSet::new();
        for (module, file) in &parsed {
            declared.extend(declared_names(module, file));
        }

        let mut types = SourceTypes {
            files_scanned: scan.rust_files.len(),
            files_parsed: parsed.len(),
            ..SourceTypes::default()
        };
        for (module, file) in &parsed {
            types.decls.extend(collect_decls_in(module, file, &declared));
        }
        debug!("Collected {} declaration(s)", types.decls.len());
        Ok(types)
    }
}

/// Parse one Rust source file.
pub fn parse_file(path: &Path) -> Result<syn::File> {
    debug!("Parsing file: {}", path.display());
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    syn::parse_file(&content)
        .with_context(|| format!("Failed to parse Rust syntax in file: {}", path.display()))
}

/// Module path of a file relative to the scanned root.
///
/// A leading `src` directory is dropped, and `lib.rs`, `main.rs` and `mod.rs`
/// name their parent module: `src/models/mod.rs` and `src/models.rs` are both
/// `models`.
pub fn module_path(root: &Path, file: &Path) -> Vec<String> {
    let relative = file.strip_prefix(root).unwrap_or(file);
    let mut segments: Vec<String> = relative
        .with_extension("")
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if segments.first().map(String::as_str) == Some("src") {
        segments.remove(0);
    }
    if matches!(
        segments.last().map(String::as_str),
        Some("lib" | "main" | "mod")
    ) {
        segments.pop();
    }
    segments
}

/// Collect the declarations of a parsed file registered under `module`.
///
/// Paths are resolved against the declarations of this file only; use
/// [`SourceScanner::load`] to resolve across a whole tree.
pub fn collect_decls(module: &[String], file: &syn::File) -> Vec<TypeDecl> {
    collect_decls_in(module, file, &declared_names(module, file))
}

fn collect_decls_in(
    module: &[String],
    file: &syn::File,
    declared: &HashSet<String>,
) -> Vec<TypeDecl> {
    let mut collector = DeclCollector {
        module: module.to_vec(),
        imports: imports_of(&file.items),
        declared,
        decls: Vec::new(),
    };
    collector.visit_file(file);
    collector.decls
}

/// Qualified names of every type a file declares.
fn declared_names(module: &[String], file: &syn::File) -> HashSet<String> {
    let mut names = DeclaredNames {
        module: module.to_vec(),
        names: HashSet::new(),
    };
    names.visit_file(file);
    names.names
}

fn qualify(module: &[String], ident: &syn::Ident) -> String {
    let mut segments = module.to_vec();
    segments.push(unraw(ident));
    segments.join("::")
}

struct DeclaredNames {
    module: Vec<String>,
    names: HashSet<String>,
}

impl<'ast> Visit<'ast> for DeclaredNames {
    fn visit_item_mod(&mut self, node: &'ast syn::ItemMod) {
        if node.content.is_none() {
            return;
        }
        self.module.push(unraw(&node.ident));
        syn::visit::visit_item_mod(self, node);
        self.module.pop();
    }

    fn visit_item_fn(&mut self, _node: &'ast syn::ItemFn) {}

    fn visit_item_impl(&mut self, _node: &'ast syn::ItemImpl) {}

    fn visit_item_struct(&mut self, node: &'ast syn::ItemStruct) {
        self.names.insert(qualify(&self.module, &node.ident));
    }

    fn visit_item_enum(&mut self, node: &'ast syn::ItemEnum) {
        self.names.insert(qualify(&self.module, &node.ident));
    }

    fn visit_item_type(&mut self, node: &'ast syn::ItemType) {
        self.names.insert(qualify(&self.module, &node.ident));
    }
}

struct DeclCollector<'d> {
    module: Vec<String>,
    /// `use` imports of the current module: local name → path as written
    imports: HashMap<String, Vec<String>>,
    /// Every qualified name declared in the scanned tree
    declared: &'d HashSet<String>,
    decls: Vec<TypeDecl>,
}

impl DeclCollector<'_> {
    fn qualified(&self, ident: &syn::Ident) -> String {
        qualify(&self.module, ident)
    }

    fn type_expr(&self, ty: &syn::Type, generics: &[String]) -> TypeExpr {
        TypeExpr::from_syn_with(ty, &|path: &syn::Path| self.resolve(path, generics))
    }

    /// Name a type path as seen from the current module.
    fn resolve(&self, path: &syn::Path, generics: &[String]) -> String {
        let segments: Vec<String> = path.segments.iter().map(|s| unraw(&s.ident)).collect();
        if let [single] = segments.as_slice() {
            if generics.contains(single) {
                return single.clone();
            }
        }
        if is_anchored(&segments) {
            return anchored(&self.module, &segments).join("::");
        }

        let mut candidates = vec![self.in_module(&segments)];
        if let Some(target) = segments.first().and_then(|first| self.imports.get(first)) {
            let mut imported = target.clone();
            imported.extend(segments[1..].iter().cloned());
            if is_anchored(&imported) {
                candidates.push(anchored(&self.module, &imported));
            } else {
                candidates.push(self.in_module(&imported));
                candidates.push(imported);
            }
        }
        candidates
            .into_iter()
            .map(|candidate| candidate.join("::"))
            .find(|name| self.declared.contains(name))
            .unwrap_or_else(|| segments.join("::"))
    }

    fn in_module(&self, segments: &[String]) -> Vec<String> {
        let mut path = self.module.clone();
        path.extend(segments.iter().cloned());
        path
    }
}

impl<'ast> Visit<'ast> for DeclCollector<'_> {
    fn visit_item_mod(&mut self, node: &'ast syn::ItemMod) {
        let Some((_, items)) = &node.content else {
            return;
        };
        self.module.push(unraw(&node.ident));
        let outer = std::mem::replace(&mut self.imports, imports_of(items));
        syn::visit::visit_item_mod(self, node);
        self.imports = outer;
        self.module.pop();
    }

    // Items nested in function bodies and impls are not nameable from routes
    fn visit_item_fn(&mut self, _node: &'ast syn::ItemFn) {}

    fn visit_item_impl(&mut self, _node: &'ast syn::ItemImpl) {}

    fn visit_item_struct(&mut self, node: &'ast syn::ItemStruct) {
        let generics = generic_names(&node.generics);
        let decl = struct_decl(self.qualified(&node.ident), node, &|ty: &syn::Type| {
            self.type_expr(ty, &generics)
        });
        debug!("Found struct {}", decl.name);
        self.decls.push(decl);
    }

    fn visit_item_enum(&mut self, node: &'ast syn::ItemEnum) {
        let generics = generic_names(&node.generics);
        let decl = enum_decl(self.qualified(&node.ident), node, &|ty: &syn::Type| {
            self.type_expr(ty, &generics)
        });
        debug!("Found enum {}", decl.name);
        self.decls.push(decl);
    }

    fn visit_item_type(&mut self, node: &'ast syn::ItemType) {
        let generics = generic_names(&node.generics);
        let mut decl = TypeDecl::with_body(
            self.qualified(&node.ident),
            DeclBody::Alias(self.type_expr(&node.ty, &generics)),
        );
        decl.generics = generics;
        debug!("Found type alias {}", decl.name);
        self.decls.push(decl);
    }
}

fn is_anchored(segments: &[String]) -> bool {
    matches!(
        segments.first().map(String::as_str),
        Some("crate" | "self" | "super")
    )
}

/// Resolve a path that starts with `crate`, `self` or `super` against `module`.
fn anchored(module: &[String], segments: &[String]) -> Vec<String> {
    let mut base = module.to_vec();
    let mut rest = segments;
    while let Some((first, tail)) = rest.split_first() {
        match first.as_str() {
            "crate" => base.clear(),
            "self" => {}
            "super" => {
                base.pop();
            }
            _ => break,
        }
        rest = tail;
    }
    base.extend(rest.iter().cloned());
    base
}

/// `use` declarations among `items`: local name → imported path as written.
/// Glob imports are not followed.
fn imports_of(items: &[syn::Item]) -> HashMap<String, Vec<String>> {
    let mut imports = HashMap::new();
    for item in items {
        if let syn::Item::Use(item_use) = item {
            collect_use_tree(&item_use.tree, &mut Vec::new(), &mut imports);
        }
    }
    imports
}

fn collect_use_tree(
    tree: &syn::UseTree,
    prefix: &mut Vec<String>,
    imports: &mut HashMap<String, Vec<String>>,
) {
    match tree {
        syn::UseTree::Path(path) => {
            prefix.push(unraw(&path.ident));
            collect_use_tree(&path.tree, prefix, imports);
            prefix.pop();
        }
        syn::UseTree::Name(name) => {
            let ident = unraw(&name.ident);
            if ident == "self" {
                if let Some(last) = prefix.last() {
                    imports.insert(last.clone(), prefix.clone());
                }
            } else {
                let mut target = prefix.clone();
                target.push(ident.clone());
                imports.insert(ident, target);
            }
        }
        syn::UseTree::Rename(rename) => {
            let mut target = prefix.clone();
            target.push(unraw(&rename.ident));
            imports.insert(unraw(&rename.rename), target);
        }
        syn::UseTree::Glob(_) => {}
        syn::UseTree::Group(group) => {
            for item in &group.items {
                collect_use_tree(item, prefix, imports);
            }
        }
    }
}

fn struct_decl(
    name: String,
    item: &syn::ItemStruct,
    type_expr: &dyn Fn(&syn::Type) -> TypeExpr,
) -> TypeDecl {
    let container = SerdeAttributes::parse(&item.attrs);
    let body = match &item.fields {
        syn::Fields::Named(named) => {
            let mut fields = Vec::new();
            for field in &named.named {
                let Some(ident) = &field.ident else {
                    continue;
                };
                let attrs = SerdeAttributes::parse(&field.attrs);
                if attrs.flatten {
                    warn!(
                        "Field `{}` of `{}` is flattened and left out of the schema",
                        ident, name
                    );
                    continue;
                }
                let wire_name = attrs.rename.clone().unwrap_or_else(|| {
                    let ident = unraw(ident);
                    match container.rename_all {
                        Some(rule) => rule.apply_to_field(&ident),
                        None => ident,
                    }
                });
                fields.push(FieldDecl {
                    name: wire_name,
                    ty: type_expr(&field.ty),
                    nullable: false,
                    skip: attrs.skip,
                });
            }
            DeclBody::Object {
                fields,
                additional_properties: !container.deny_unknown_fields,
            }
        }
        syn::Fields::Unnamed(unnamed) if unnamed.unnamed.len() == 1 => {
            DeclBody::Alias(type_expr(&unnamed.unnamed[0].ty))
        }
        syn::Fields::Unnamed(_) => DeclBody::Opaque {
            reason: "tuple struct".to_string(),
        },
        syn::Fields::Unit => DeclBody::Object {
            fields: Vec::new(),
            additional_properties: !container.deny_unknown_fields,
        },
    };

    let mut decl = TypeDecl::with_body(name, body);
    decl.generics = generic_names(&item.generics);
    decl
}

fn enum_decl(
    name: String,
    item: &syn::ItemEnum,
    type_expr: &dyn Fn(&syn::Type) -> TypeExpr,
) -> TypeDecl {
    let container = SerdeAttributes::parse(&item.attrs);
    let variants: Vec<(String, &syn::Variant)> = item
        .variants
        .iter()
        .filter_map(|variant| {
            let attrs = SerdeAttributes::parse(&variant.attrs);
            if attrs.skip {
                return None;
            }
            let wire_name = attrs.rename.unwrap_or_else(|| {
                let ident = unraw(&variant.ident);
                match container.rename_all {
                    Some(rule) => rule.apply_to_variant(&ident),
                    None => ident,
                }
            });
            Some((wire_name, variant))
        })
        .collect();

    let all_unit = variants
        .iter()
        .all(|(_, v)| matches!(v.fields, syn::Fields::Unit));
    let all_newtype = variants.iter().all(|(_, v)| {
        matches!(&v.fields, syn::Fields::Unnamed(fields) if fields.unnamed.len() == 1)
    });

    let mut decl = if all_unit && container.tag.is_none() {
        TypeDecl::enumeration(name, variants.into_iter().map(|(n, _)| n).collect())
    } else if all_newtype
        && container.content.is_none()
        && (container.tag.is_some() || container.untagged)
    {
        let mut subtypes = Vec::new();
        let mut mapping = Vec::new();
        for (wire_name, variant) in &variants {
            if let syn::Fields::Unnamed(fields) = &variant.fields {
                let ty = type_expr(&fields.unnamed[0].ty);
                mapping.push((wire_name.clone(), ty.clone()));
                subtypes.push(ty);
            }
        }
        let mut decl = TypeDecl::object(name, Vec::new());
        decl.subtypes = subtypes;
        decl.discriminator = container.tag.map(|property| DiscriminatorDecl { property, mapping });
        decl
    } else {
        let reason = if container.content.is_some() {
            "adjacently tagged enum"
        } else if container.tag.is_some() || container.untagged {
            "enum with struct or tuple variants"
        } else {
            "externally tagged data enum"
        };
        TypeDecl::with_body(
            name,
            DeclBody::Opaque {
                reason: reason.to_string(),
            },
        )
    };
    decl.generics = generic_names(&item.generics);
    decl
}

fn generic_names(generics: &syn::Generics) -> Vec<String> {
    generics
        .type_params()
        .map(|param| param.ident.to_string())
        .collect()
}

fn unraw(ident: &syn::Ident) -> String {
    let text = ident.to_string();
    match text.strip_prefix("r#") {
        Some(stripped) => stripped.to_string(),
        None => text,
    }
}

/// The serde attributes that change a type's wire shape.
#[derive(Debug, Clone, Default, PartialEq)]
struct SerdeAttributes {
    rename: Option<String>,
    rename_all: Option<RenameRule>,
    skip: bool,
    flatten: bool,
    deny_unknown_fields: bool,
    tag: Option<String>,
    content: Option<String>,
    untagged: bool,
}

impl SerdeAttributes {
    fn parse(attrs: &[syn::Attribute]) -> Self {
        let mut serde_attrs = SerdeAttributes::default();
        for attr in attrs {
            if !attr.path().is_ident("serde") {
                continue;
            }
            if let Err(e) = attr.parse_nested_meta(|meta| serde_attrs.apply(meta)) {
                warn!("Ignoring unreadable serde attribute: {}", e);
            }
        }
        serde_attrs
    }

    fn apply(&mut self, meta: ParseNestedMeta) -> syn::Result<()> {
        if meta.path.is_ident("rename") {
            if let Some(value) = serialize_value(&meta)? {
                debug!("Found serde rename: {}", value);
                self.rename = Some(value);
            }
        } else if meta.path.is_ident("rename_all") {
            if let Some(value) = serialize_value(&meta)? {
                self.rename_all = RenameRule::parse(&value);
                if self.rename_all.is_none() {
                    warn!("Unknown rename_all rule `{}`", value);
                }
            }
        } else if meta.path.is_ident("skip")
            || meta.path.is_ident("skip_serializing")
            || meta.path.is_ident("skip_deserializing")
        {
            self.skip = true;
        } else if meta.path.is_ident("flatten") {
            self.flatten = true;
        } else if meta.path.is_ident("deny_unknown_fields") {
            self.deny_unknown_fields = true;
        } else if meta.path.is_ident("untagged") {
            self.untagged = true;
        } else if meta.path.is_ident("tag") {
            self.tag = Some(meta.value()?.parse::<syn::LitStr>()?.value());
        } else if meta.path.is_ident("content") {
            self.content = Some(meta.value()?.parse::<syn::LitStr>()?.value());
        } else {
            skip_meta(&meta)?;
        }
        Ok(())
    }
}

/// The value of `key = "..."`, or the `serialize` half of `key(serialize = "...", ...)`.
fn serialize_value(meta: &ParseNestedMeta) -> syn::Result<Option<String>> {
    if meta.input.peek(syn::Token![=]) {
        return Ok(Some(meta.value()?.parse::<syn::LitStr>()?.value()));
    }
    let mut value = None;
    meta.parse_nested_meta(|inner| {
        if inner.path.is_ident("serialize") {
            value = Some(inner.value()?.parse::<syn::LitStr>()?.value());
        } else {
            skip_meta(&inner)?;
        }
        Ok(())
    })?;
    Ok(value)
}

fn skip_meta(meta: &ParseNestedMeta) -> syn::Result<()> {
    if meta.input.peek(syn::Token![=]) {
        meta.value()?.parse::<syn::Expr>()?;
    } else if meta.input.peek(syn::token::Paren) {
        meta.parse_nested_meta(|inner| skip_meta(&inner))?;
    }
    Ok(())
}

/// Serde's `rename_all` rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenameRule {
    Lower,
    Upper,
    Pascal,
    Camel,
    Snake,
    ScreamingSnake,
    Kebab,
    ScreamingKebab,
}

impl RenameRule {
    fn parse(rule: &str) -> Option<Self> {
        Some(match rule {
            "lowercase" => RenameRule::Lower,
            "UPPERCASE" => RenameRule::Upper,
            "PascalCase" => RenameRule::Pascal,
            "camelCase" => RenameRule::Camel,
            "snake_case" => RenameRule::Snake,
            "SCREAMING_SNAKE_CASE" => RenameRule::ScreamingSnake,
            "kebab-case" => RenameRule::Kebab,
            "SCREAMING-KEBAB-CASE" => RenameRule::ScreamingKebab,
            _ => return None,
        })
    }

    /// Fields are written in snake_case.
    fn apply_to_field(self, field: &str) -> String {
        match self {
            RenameRule::Lower | RenameRule::Snake => field.to_string(),
            RenameRule::Upper | RenameRule::ScreamingSnake => field.to_ascii_uppercase(),
            RenameRule::Pascal => field
                .split('_')
                .map(capitalize)
                .collect::<String>(),
            RenameRule::Camel => {
                let pascal = RenameRule::Pascal.apply_to_field(field);
                lowercase_first(&pascal)
            }
            RenameRule::Kebab => field.replace('_', "-"),
            RenameRule::ScreamingKebab => field.replace('_', "-").to_ascii_uppercase(),
        }
    }

    /// Variants are written in PascalCase.
    fn apply_to_variant(self, variant: &str) -> String {
        match self {
            RenameRule::Pascal => variant.to_string(),
            RenameRule::Lower => variant.to_ascii_lowercase(),
            RenameRule::Upper => variant.to_ascii_uppercase(),
            RenameRule::Camel => lowercase_first(variant),
            RenameRule::Snake => {
                let mut snake = String::new();
                for (i, c) in variant.char_indices() {
                    if c.is_uppercase() && i > 0 {
                        snake.push('_');
                    }
                    snake.push(c.to_ascii_lowercase());
                }
                snake
            }
            RenameRule::ScreamingSnake => RenameRule::Snake
                .apply_to_variant(variant)
                .to_ascii_uppercase(),
            RenameRule::Kebab => RenameRule::Snake.apply_to_variant(variant).replace('_', "-"),
            RenameRule::ScreamingKebab => RenameRule::ScreamingSnake
                .apply_to_variant(variant)
                .replace('_', "-"),
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

fn lowercase_first(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}
