//! Import scanning for dependency resolution.
//!
//! Walks a parsed module and collects every reference into the core
//! (`bosun.task_utils`) and pack (`bosun_packs.*`) support namespaces,
//! including references reached through relative imports inside support
//! units. References found inside compound statements are marked nested so
//! the resolver can treat them as optional.

use rustpython_parser::ast;
use tracing::trace;

use crate::constants::{
    CORE_NAMESPACE, PACK_NAMESPACE_ROOT, PACK_PLUGIN_PATH, PACK_UNIT_MIN_SEGMENTS,
};
use crate::name::UnitName;

/// A single support-namespace reference found in source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRef {
    /// Dotted name as written, one segment per component. For
    /// `from pkg import name` forms the bound name is appended, so a
    /// reference may point at either a unit or an attribute inside one.
    pub name: UnitName,
    /// True when the import statement sits inside a compound statement
    /// (function, class, conditional, try block). Nested imports are
    /// resolved best-effort and dropped when they cannot be found.
    pub nested: bool,
}

/// Scan `body` for support references. `owner` is the dotted name of the
/// module being scanned and anchors relative imports; `is_package_init`
/// must be true when the module is a package `__init__`, since relative
/// levels count from the package itself there.
pub fn scan_imports(
    body: &[ast::Stmt],
    owner: &UnitName,
    is_package_init: bool,
) -> Vec<ImportRef> {
    let mut scanner = ImportScanner {
        owner,
        is_package_init,
        refs: Vec::new(),
    };
    scanner.visit_body(body, true);
    scanner.refs
}

struct ImportScanner<'a> {
    owner: &'a UnitName,
    is_package_init: bool,
    refs: Vec<ImportRef>,
}

impl ImportScanner<'_> {
    fn visit_body(&mut self, body: &[ast::Stmt], top_level: bool) {
        for stmt in body {
            self.visit_stmt(stmt, top_level);
        }
    }

    fn visit_stmt(&mut self, stmt: &ast::Stmt, top_level: bool) {
        match stmt {
            ast::Stmt::Import(node) => self.on_import(node, top_level),
            ast::Stmt::ImportFrom(node) => self.on_import_from(node, top_level),
            ast::Stmt::FunctionDef(ast::StmtFunctionDef { body, .. })
            | ast::Stmt::AsyncFunctionDef(ast::StmtAsyncFunctionDef { body, .. })
            | ast::Stmt::ClassDef(ast::StmtClassDef { body, .. })
            | ast::Stmt::With(ast::StmtWith { body, .. })
            | ast::Stmt::AsyncWith(ast::StmtAsyncWith { body, .. }) => {
                self.visit_body(body, false);
            }
            ast::Stmt::For(ast::StmtFor { body, orelse, .. })
            | ast::Stmt::AsyncFor(ast::StmtAsyncFor { body, orelse, .. })
            | ast::Stmt::While(ast::StmtWhile { body, orelse, .. })
            | ast::Stmt::If(ast::StmtIf { body, orelse, .. }) => {
                self.visit_body(body, false);
                self.visit_body(orelse, false);
            }
            ast::Stmt::Try(ast::StmtTry {
                body,
                handlers,
                orelse,
                finalbody,
                ..
            })
            | ast::Stmt::TryStar(ast::StmtTryStar {
                body,
                handlers,
                orelse,
                finalbody,
                ..
            }) => {
                self.visit_body(body, false);
                for handler in handlers {
                    let ast::ExceptHandler::ExceptHandler(handler) = handler;
                    self.visit_body(&handler.body, false);
                }
                self.visit_body(orelse, false);
                self.visit_body(finalbody, false);
            }
            ast::Stmt::Match(ast::StmtMatch { cases, .. }) => {
                for case in cases {
                    self.visit_body(&case.body, false);
                }
            }
            _ => {}
        }
    }

    /// `import a.b.c` forms. Only dotted names that reach below a support
    /// namespace root are collected; `import bosun.task_utils` alone names
    /// the namespace package, not a unit.
    fn on_import(&mut self, node: &ast::StmtImport, top_level: bool) {
        for alias in &node.names {
            let segments: Vec<&str> = alias.name.as_str().split('.').collect();
            let is_core = segments.len() > CORE_NAMESPACE.len()
                && segments[..CORE_NAMESPACE.len()] == CORE_NAMESPACE;
            let is_pack = segments.len() > 1 && segments[0] == PACK_NAMESPACE_ROOT;
            if is_core || is_pack {
                self.push(UnitName::from_segments(segments), top_level);
            }
        }
    }

    /// `from a.b import c` forms, including relative imports resolved
    /// against the owning unit. The bound name is appended to the source
    /// module, so `from bosun.task_utils import basic` records
    /// `bosun.task_utils.basic`.
    fn on_import_from(&mut self, node: &ast::StmtImportFrom, top_level: bool) {
        let level = node.level.map(|l| l.to_u32()).unwrap_or(0) as usize;

        let base = if level > 0 {
            // A relative level of one names the current package; each
            // additional level climbs one package higher. Inside a package
            // __init__ the unit name already is the package name.
            let dropped = if self.is_package_init { level - 1 } else { level };
            let owner = self.owner.segments();
            if dropped > owner.len() {
                return;
            }
            let mut base: Vec<String> = owner[..owner.len() - dropped].to_vec();
            if let Some(module) = &node.module {
                base.extend(module.as_str().split('.').map(str::to_string));
            }
            base
        } else {
            match &node.module {
                Some(module) => module.as_str().split('.').map(str::to_string).collect(),
                None => return,
            }
        };

        if !self.is_support_module(&base) {
            return;
        }

        for alias in &node.names {
            let mut segments = base.clone();
            segments.push(alias.name.as_str().to_string());
            self.push(UnitName::new(segments), top_level);
        }
    }

    /// Whether a `from`-import source module lies in a support namespace.
    /// Pack references must point into the `plugins/task_utils` subtree;
    /// other pack plugin types are not resolvable support code.
    fn is_support_module(&self, segments: &[String]) -> bool {
        if segments.len() >= CORE_NAMESPACE.len()
            && segments[..CORE_NAMESPACE.len()] == CORE_NAMESPACE
        {
            return true;
        }
        segments.len() >= PACK_UNIT_MIN_SEGMENTS - 1
            && segments[0] == PACK_NAMESPACE_ROOT
            && segments[3..PACK_UNIT_MIN_SEGMENTS - 1] == PACK_PLUGIN_PATH
    }

    fn push(&mut self, name: UnitName, top_level: bool) {
        trace!(reference = %name, nested = !top_level, "collected support reference");
        self.refs.push(ImportRef {
            name,
            nested: !top_level,
        });
    }
}
