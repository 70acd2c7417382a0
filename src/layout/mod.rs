// This module is the layout engine's data model: the symbol table holding one entry per
// class, method and variable of a compilation unit, addressed by small index newtypes
// (ClassId, MethodId, VarId) instead of shared pointers. Class entries record their parent,
// back-references to their children, their own methods and fields, and, once layout has
// run, the dispatch table and instance size. Method entries carry their dispatch index
// (0 until assigned), frame size and the parent method they override. Variable entries
// carry a signed word offset where 0 means "unassigned"; reading an unassigned offset is an
// internal defect. The table is collected from the syntax tree in declaration order, then
// laid out by layout_classes(): the dispatch-table pass (vtable.rs) over every class in
// parent-before-child order, and only afterwards the field-offset pass. Frames are
// assigned per method right before its code is generated (frame.rs), and name lookup
// during generation goes through the scope stack in context.rs.

//! Symbol table and memory layout of classes, methods and variables.
//!
//! # Components
//!
//! - [`SymbolTable`] - entries for every class, method and variable
//! - [`vtable`] - dispatch-table and field-offset passes
//! - [`frame`] - per-method activation record layout
//! - [`context`] - scoped name lookup during code generation

pub mod context;
pub mod frame;
pub mod vtable;

use crate::ast::{Program, Statement, Type, VarDecl};
use crate::core::error::{CompileError, CompileResult};
use crate::isa::WORD_SIZE;
use std::collections::{HashMap, VecDeque};

pub use context::{Scope, ScopeKind, SymbolContext};
pub use frame::{assign_frame, FrameLayout};
pub use vtable::{assign_field_offsets, build_dispatch_table};

/// Label of the program entry routine called by the runtime.
pub const ENTRY_LABEL: &str = "asm_main";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    /// Instance field: positive offset from the object base.
    Field,
    /// Parameter: negative offset from the frame base.
    Param,
    /// Method-level or block-scoped local: negative offset from the frame base.
    Local,
}

#[derive(Debug, Clone)]
pub struct VarEntry {
    pub name: String,
    pub ty: Type,
    pub kind: VarKind,
    /// Signed offset in words; 0 until assigned.
    offset: i64,
}

impl VarEntry {
    pub fn new(name: &str, ty: Type, kind: VarKind) -> Self {
        Self {
            name: name.to_string(),
            ty,
            kind,
            offset: 0,
        }
    }

    pub fn is_field(&self) -> bool {
        self.kind == VarKind::Field
    }

    /// Offset in words. Fails if layout has not assigned one yet.
    pub fn offset(&self) -> CompileResult<i64> {
        if self.offset == 0 {
            return Err(CompileError::UnassignedOffset {
                name: self.name.clone(),
            });
        }
        Ok(self.offset)
    }

    /// Offset in bytes from the object base (fields) or the frame base.
    pub fn byte_offset(&self) -> CompileResult<i64> {
        Ok(self.offset()? * WORD_SIZE)
    }

    pub fn is_assigned(&self) -> bool {
        self.offset != 0
    }

    pub(crate) fn assign_offset(&mut self, words: i64) -> CompileResult<()> {
        if self.offset != 0 {
            return Err(CompileError::Layout {
                reason: format!("offset of `{}` assigned twice", self.name),
            });
        }
        match self.kind {
            VarKind::Field if words <= 0 => Err(CompileError::Layout {
                reason: format!("field `{}` needs a positive offset, got {words}", self.name),
            }),
            VarKind::Param | VarKind::Local if words >= 0 => Err(CompileError::Layout {
                reason: format!("`{}` needs a negative frame offset, got {words}", self.name),
            }),
            _ => {
                self.offset = words;
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct MethodEntry {
    pub name: String,
    pub owner: ClassId,
    pub return_type: Type,
    pub params: Vec<VarId>,
    pub locals: Vec<VarId>,
    /// The static entry point; not dispatched and has no receiver.
    pub is_static: bool,
    /// Block-scoped declarations in the body, reserved in the frame up front.
    pub block_locals: usize,
    /// Position in the owning class declaration's method list.
    pub decl_index: usize,
    pub(crate) vtable_index: usize,
    pub(crate) frame_words: Option<usize>,
    pub(crate) overrides: Option<MethodId>,
}

impl MethodEntry {
    /// Dispatch table index; 0 is reserved and never valid for a dispatched method.
    pub fn vtable_index(&self) -> CompileResult<usize> {
        if self.vtable_index == 0 {
            return Err(CompileError::Layout {
                reason: format!("method `{}` has no dispatch index yet", self.name),
            });
        }
        Ok(self.vtable_index)
    }

    /// Frame size in words, once assigned.
    pub fn frame_words(&self) -> Option<usize> {
        self.frame_words
    }

    /// The parent method this one overrides, if any.
    pub fn overrides(&self) -> Option<MethodId> {
        self.overrides
    }
}

#[derive(Debug, Clone)]
pub struct ClassEntry {
    pub name: String,
    pub parent: Option<ClassId>,
    /// Back-references only.
    pub children: Vec<ClassId>,
    /// Methods declared in this class, in source order.
    pub methods: Vec<MethodId>,
    /// Fields declared in this class, in source order.
    pub fields: Vec<VarId>,
    pub(crate) vtable: Option<Vec<MethodId>>,
    pub(crate) instance_words: Option<usize>,
}

impl ClassEntry {
    /// Label of this class's dispatch table in the data section.
    pub fn vtable_label(&self) -> String {
        vtable_label(&self.name)
    }

    /// Dispatch table slots; slot `i` of the slice holds table index `i + 1`.
    pub fn dispatch_table(&self) -> CompileResult<&[MethodId]> {
        self.vtable.as_deref().ok_or_else(|| CompileError::Layout {
            reason: format!("dispatch table of `{}` read before it was built", self.name),
        })
    }

    /// Instance size in words, including the dispatch pointer.
    pub fn instance_words(&self) -> CompileResult<usize> {
        self.instance_words.ok_or_else(|| CompileError::Layout {
            reason: format!("instance size of `{}` read before offsets were assigned", self.name),
        })
    }
}

pub fn vtable_label(class: &str) -> String {
    format!("vtable.{class}")
}

/// Every class, method and variable of one compilation unit.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    classes: Vec<ClassEntry>,
    methods: Vec<MethodEntry>,
    vars: Vec<VarEntry>,
    by_name: HashMap<String, ClassId>,
    main_class: ClassId,
    main_method: MethodId,
}

impl SymbolTable {
    /// Collect entries for every declaration in `program`.
    pub fn from_program(program: &Program) -> CompileResult<Self> {
        let mut table = Self {
            classes: Vec::new(),
            methods: Vec::new(),
            vars: Vec::new(),
            by_name: HashMap::new(),
            main_class: ClassId(0),
            main_method: MethodId(0),
        };

        let main = &program.main;
        table.main_class = table.add_class(&main.name)?;
        let locals = table.add_vars(&main.locals, VarKind::Local);
        table.main_method = table.add_method(MethodEntry {
            name: "main".to_string(),
            owner: table.main_class,
            return_type: Type::Void,
            params: Vec::new(),
            locals,
            is_static: true,
            block_locals: count_block_locals(&main.body),
            decl_index: 0,
            vtable_index: 0,
            frame_words: None,
            overrides: None,
        });

        for decl in &program.classes {
            let id = table.add_class(&decl.name)?;
            let fields = table.add_vars(&decl.fields, VarKind::Field);
            check_unique(&decl.name, "field", decl.fields.iter().map(|f| f.name.as_str()))?;
            check_unique(&decl.name, "method", decl.methods.iter().map(|m| m.name.as_str()))?;
            let mut methods = Vec::with_capacity(decl.methods.len());
            for (decl_index, m) in decl.methods.iter().enumerate() {
                let params = table.add_vars(&m.params, VarKind::Param);
                let locals = table.add_vars(&m.locals, VarKind::Local);
                methods.push(table.add_method(MethodEntry {
                    name: m.name.clone(),
                    owner: id,
                    return_type: m.return_type.clone(),
                    params,
                    locals,
                    is_static: false,
                    block_locals: count_block_locals(&m.body),
                    decl_index,
                    vtable_index: 0,
                    frame_words: None,
                    overrides: None,
                }));
            }
            let entry = &mut table.classes[id.0];
            entry.fields = fields;
            entry.methods = methods;
        }

        for decl in &program.classes {
            if let Some(parent) = &decl.parent {
                let child = table.class_id(&decl.name)?;
                let parent = table.class_id(parent)?;
                table.classes[child.0].parent = Some(parent);
                table.classes[parent.0].children.push(child);
            }
        }

        log::debug!(
            "collected {} classes, {} methods, {} variables",
            table.classes.len(),
            table.methods.len(),
            table.vars.len()
        );
        Ok(table)
    }

    fn add_class(&mut self, name: &str) -> CompileResult<ClassId> {
        if self.by_name.contains_key(name) {
            return Err(CompileError::Layout {
                reason: format!("class `{name}` declared twice"),
            });
        }
        let id = ClassId(self.classes.len());
        self.classes.push(ClassEntry {
            name: name.to_string(),
            parent: None,
            children: Vec::new(),
            methods: Vec::new(),
            fields: Vec::new(),
            vtable: None,
            instance_words: None,
        });
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    fn add_method(&mut self, entry: MethodEntry) -> MethodId {
        let id = MethodId(self.methods.len());
        self.methods.push(entry);
        id
    }

    fn add_vars(&mut self, decls: &[VarDecl], kind: VarKind) -> Vec<VarId> {
        decls
            .iter()
            .map(|d| self.add_var(VarEntry::new(&d.name, d.ty.clone(), kind)))
            .collect()
    }

    /// Add a variable entry, e.g. a block-scoped local met during code generation.
    pub fn add_var(&mut self, entry: VarEntry) -> VarId {
        let id = VarId(self.vars.len());
        self.vars.push(entry);
        id
    }

    pub fn class(&self, id: ClassId) -> &ClassEntry {
        &self.classes[id.0]
    }

    pub(crate) fn class_mut(&mut self, id: ClassId) -> &mut ClassEntry {
        &mut self.classes[id.0]
    }

    pub fn method(&self, id: MethodId) -> &MethodEntry {
        &self.methods[id.0]
    }

    pub(crate) fn method_mut(&mut self, id: MethodId) -> &mut MethodEntry {
        &mut self.methods[id.0]
    }

    pub fn var(&self, id: VarId) -> &VarEntry {
        &self.vars[id.0]
    }

    pub(crate) fn var_mut(&mut self, id: VarId) -> &mut VarEntry {
        &mut self.vars[id.0]
    }

    pub fn class_id(&self, name: &str) -> CompileResult<ClassId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| CompileError::UnresolvedSymbol {
                name: name.to_string(),
            })
    }

    /// All classes in declaration order, the main class first.
    pub fn class_ids(&self) -> impl Iterator<Item = ClassId> {
        (0..self.classes.len()).map(ClassId)
    }

    pub fn main_class(&self) -> ClassId {
        self.main_class
    }

    pub fn main_method(&self) -> MethodId {
        self.main_method
    }

    /// Entry label of a method's code.
    pub fn method_label(&self, id: MethodId) -> String {
        let method = self.method(id);
        if method.is_static {
            ENTRY_LABEL.to_string()
        } else {
            format!("method.{}.{}", self.class(method.owner).name, method.name)
        }
    }

    /// Classes ordered so every parent precedes its children.
    ///
    /// Fails on inheritance cycles, which leave classes unreachable from any root.
    pub fn topological_order(&self) -> CompileResult<Vec<ClassId>> {
        let mut queue: VecDeque<ClassId> = self
            .class_ids()
            .filter(|&c| self.class(c).parent.is_none())
            .collect();
        let mut order = Vec::with_capacity(self.classes.len());
        while let Some(class) = queue.pop_front() {
            order.push(class);
            queue.extend(self.class(class).children.iter().copied());
        }
        if order.len() != self.classes.len() {
            let stuck: Vec<&str> = self
                .class_ids()
                .filter(|c| !order.contains(c))
                .map(|c| self.class(c).name.as_str())
                .collect();
            return Err(CompileError::Layout {
                reason: format!("inheritance cycle through {}", stuck.join(", ")),
            });
        }
        Ok(order)
    }

    /// Resolve `name` through the dispatch table of `class`, inherited methods included.
    pub fn find_method(&self, class: ClassId, name: &str) -> CompileResult<MethodId> {
        let table = self.class(class).dispatch_table()?;
        table
            .iter()
            .copied()
            .find(|&m| self.method(m).name == name)
            .ok_or_else(|| CompileError::UnresolvedSymbol {
                name: format!("{}.{}", self.class(class).name, name),
            })
    }

    /// Resolve field `name` in `class` or its ancestors; the nearest declaration wins.
    pub fn find_field(&self, class: ClassId, name: &str) -> CompileResult<VarId> {
        let mut current = Some(class);
        while let Some(c) = current {
            let entry = self.class(c);
            if let Some(&field) = entry.fields.iter().find(|&&f| self.var(f).name == name) {
                return Ok(field);
            }
            current = entry.parent;
        }
        Err(CompileError::UnresolvedSymbol {
            name: format!("{}.{}", self.class(class).name, name),
        })
    }

    /// The chain from `class` up to its root, `class` first.
    pub fn ancestors(&self, class: ClassId) -> Vec<ClassId> {
        let mut chain = vec![class];
        let mut current = self.class(class).parent;
        while let Some(c) = current {
            chain.push(c);
            current = self.class(c).parent;
        }
        chain
    }
}

fn count_block_locals(body: &[Statement]) -> usize {
    body.iter().map(Statement::block_local_count).sum()
}

fn check_unique<'a>(
    class: &str,
    what: &str,
    names: impl Iterator<Item = &'a str>,
) -> CompileResult<()> {
    let mut seen = std::collections::HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(CompileError::Layout {
                reason: format!("{what} `{name}` declared twice in `{class}`"),
            });
        }
    }
    Ok(())
}

/// Run both class layout passes over the whole unit: dispatch tables for every class in
/// parent-before-child order, then field offsets.
pub fn layout_classes(table: &mut SymbolTable) -> CompileResult<()> {
    let order = table.topological_order()?;
    for &class in &order {
        build_dispatch_table(table, class)?;
    }
    for &class in &order {
        assign_field_offsets(table, class)?;
    }
    log::info!("laid out {} classes", order.len());
    Ok(())
}
