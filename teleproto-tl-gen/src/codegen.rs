//! Emission of the `types`, `functions` and `enums` modules.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use teleproto_tl_parser::tl::{Category, Definition, Parameter, ParameterType, Type};

use crate::metadata::{self, Metadata};
use crate::names as n;

/// What to generate.
#[derive(Clone, Debug)]
pub struct Config {
    /// Value of the emitted `LAYER` constant.
    pub layer: i32,
    /// Implement `Deserializable` for functions too (needed by servers).
    pub deserializable_functions: bool,
    /// Derive `Debug` on every generated item.
    pub impl_debug: bool,
    /// `From<types::T> for enums::E`.
    pub impl_from_type: bool,
    /// `TryFrom<enums::E> for types::T`.
    pub impl_from_enum: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            layer: 0,
            deserializable_functions: false,
            impl_debug: true,
            impl_from_type: true,
            impl_from_enum: true,
        }
    }
}

/// One writer per generated file.
pub struct Outputs<W: Write> {
    /// `LAYER` and other crate-level items.
    pub common: W,
    /// `pub mod types`.
    pub types: W,
    /// `pub mod functions`.
    pub functions: W,
    /// `pub mod enums`.
    pub enums: W,
}

impl Outputs<File> {
    /// Creates `generated_{common,types,functions,enums}.rs` inside `out_dir`.
    pub fn from_dir(out_dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = out_dir.as_ref();
        Ok(Self {
            common: File::create(dir.join("generated_common.rs"))?,
            types: File::create(dir.join("generated_types.rs"))?,
            functions: File::create(dir.join("generated_functions.rs"))?,
            enums: File::create(dir.join("generated_enums.rs"))?,
        })
    }
}

impl<W: Write> Outputs<W> {
    /// Flushes every writer.
    pub fn flush(&mut self) -> io::Result<()> {
        self.common.flush()?;
        self.types.flush()?;
        self.functions.flush()?;
        self.enums.flush()
    }
}

const HEADER: &str = "// @generated by teleproto-tl-gen, do not edit";
const PRELUDE: &str = "#[allow(unused_imports)]\nuse crate::{Deserializable, Identifiable, Serializable};";

/// Generates all modules for `defs` into `outputs`.
pub fn generate<W: Write>(defs: &[Definition], config: &Config, outputs: &mut Outputs<W>) -> io::Result<()> {
    let emitter = Emitter { config, meta: Metadata::build(defs) };

    writeln!(outputs.common, "{HEADER}\n")?;
    writeln!(outputs.common, "/// Schema layer these definitions were generated from.")?;
    writeln!(outputs.common, "pub const LAYER: i32 = {};", config.layer)?;

    emitter.definitions_mod(&mut outputs.types, "types", defs, Category::Types)?;
    emitter.definitions_mod(&mut outputs.functions, "functions", defs, Category::Functions)?;
    emitter.enums_mod(&mut outputs.enums, defs)
}

struct Emitter<'a> {
    config: &'a Config,
    meta: Metadata<'a>,
}

/// Opens `pub mod ns {` when `ns` is not the global namespace and
/// returns the indentation for its items.
fn open_namespace<W: Write>(out: &mut W, ns: &str) -> io::Result<&'static str> {
    if ns.is_empty() {
        return Ok("    ");
    }
    writeln!(out, "\n    pub mod {ns} {{")?;
    for line in PRELUDE.lines() {
        writeln!(out, "        {line}")?;
    }
    Ok("        ")
}

fn close_namespace<W: Write>(out: &mut W, ns: &str) -> io::Result<()> {
    if ns.is_empty() { Ok(()) } else { writeln!(out, "    }}") }
}

/// `<X, Y>` with each name followed by `bounds`.
fn generics(def: &Definition, bounds: &str) -> String {
    let mut names: Vec<&str> = Vec::new();
    for param in &def.params {
        if let ParameterType::Normal { ty, .. } = &param.ty {
            if ty.generic_ref && !names.contains(&ty.name.as_str()) {
                names.push(&ty.name);
            }
        }
    }
    if names.is_empty() {
        return String::new();
    }
    let list: Vec<String> = names.iter().map(|name| format!("{name}{bounds}")).collect();
    format!("<{}>", list.join(", "))
}

fn is_bool_flag(ty: &Type) -> bool {
    ty.name == "true"
}

impl<'a> Emitter<'a> {
    fn derives<W: Write>(&self, out: &mut W, indent: &str) -> io::Result<()> {
        if self.config.impl_debug {
            writeln!(out, "{indent}#[derive(Debug)]")?;
        }
        writeln!(out, "{indent}#[derive(Clone, PartialEq)]")
    }

    fn definitions_mod<W: Write>(
        &self,
        out: &mut W,
        module: &str,
        defs: &[Definition],
        category: Category,
    ) -> io::Result<()> {
        writeln!(out, "{HEADER}\n")?;
        writeln!(out, "pub mod {module} {{")?;
        for line in PRELUDE.lines() {
            writeln!(out, "    {line}")?;
        }

        for (ns, group) in metadata::group_by_namespace(defs, category) {
            let indent = open_namespace(out, &ns)?;
            for def in group {
                self.definition(out, indent, def)?;
            }
            close_namespace(out, &ns)?;
        }
        writeln!(out, "}}")
    }

    fn definition<W: Write>(&self, out: &mut W, indent: &str, def: &Definition) -> io::Result<()> {
        let name = n::def_type_name(def);
        let plain = generics(def, "");
        let is_function = def.category == Category::Functions;

        writeln!(out, "\n{indent}/// `{}#{:08x}`", def.full_name(), def.id)?;
        writeln!(out, "{indent}///\n{indent}/// ```tl\n{indent}/// {def}\n{indent}/// ```")?;
        self.derives(out, indent)?;
        writeln!(out, "{indent}pub struct {name}{plain} {{")?;
        for param in &def.params {
            if param.ty != ParameterType::Flags {
                writeln!(out, "{indent}    pub {}: {},", n::param_attr_name(param), n::param_qual_name(param))?;
            }
        }
        writeln!(out, "{indent}}}")?;

        writeln!(out, "{indent}impl{plain} Identifiable for {name}{plain} {{")?;
        writeln!(out, "{indent}    const CONSTRUCTOR_ID: u32 = {:#010x};", def.id)?;
        writeln!(out, "{indent}}}")?;

        // Serializable
        let bounded = generics(def, ": Serializable");
        let buf = if def.params.is_empty() && !is_function { "_buf" } else { "buf" };
        writeln!(out, "{indent}impl{bounded} Serializable for {name}{plain} {{")?;
        writeln!(out, "{indent}    fn serialize(&self, {buf}: &mut impl Extend<u8>) {{")?;
        if is_function {
            writeln!(out, "{indent}        Self::CONSTRUCTOR_ID.serialize(buf);")?;
        }
        for param in &def.params {
            self.serialize_param(out, indent, def, param)?;
        }
        writeln!(out, "{indent}    }}")?;
        writeln!(out, "{indent}}}")?;

        if !is_function || self.config.deserializable_functions {
            self.deserializable(out, indent, def)?;
        }

        if is_function {
            let bounded = generics(def, ": Serializable + Deserializable");
            writeln!(out, "{indent}impl{bounded} crate::RemoteCall for {name}{plain} {{")?;
            writeln!(out, "{indent}    type Return = {};", n::type_qual_name(&def.ty))?;
            writeln!(out, "{indent}}}")?;
        }
        Ok(())
    }

    fn serialize_param<W: Write>(
        &self,
        out: &mut W,
        indent: &str,
        def: &Definition,
        param: &Parameter,
    ) -> io::Result<()> {
        let body = format!("{indent}        ");
        match &param.ty {
            ParameterType::Flags if Metadata::is_unused_flag(def, param) => {
                writeln!(out, "{body}0u32.serialize(buf);")
            }
            ParameterType::Flags => {
                writeln!(out, "{body}let mut {} = 0u32;", param.name)?;
                for other in &def.params {
                    let ParameterType::Normal { ty, flag: Some(flag) } = &other.ty else {
                        continue;
                    };
                    if flag.name != param.name {
                        continue;
                    }
                    let attr = n::param_attr_name(other);
                    let test = if is_bool_flag(ty) { format!("self.{attr}") } else { format!("self.{attr}.is_some()") };
                    writeln!(out, "{body}if {test} {{ {} |= 1 << {}; }}", param.name, flag.index)?;
                }
                writeln!(out, "{body}{}.serialize(buf);", param.name)
            }
            ParameterType::Normal { ty, flag: Some(_) } if is_bool_flag(ty) => Ok(()),
            ParameterType::Normal { flag: Some(_), .. } => {
                let attr = n::param_attr_name(param);
                writeln!(out, "{body}if let Some(value) = &self.{attr} {{ value.serialize(buf); }}")
            }
            ParameterType::Normal { flag: None, .. } => {
                writeln!(out, "{body}self.{}.serialize(buf);", n::param_attr_name(param))
            }
        }
    }

    fn deserializable<W: Write>(&self, out: &mut W, indent: &str, def: &Definition) -> io::Result<()> {
        let name = n::def_type_name(def);
        let plain = generics(def, "");
        let bounded = generics(def, ": Deserializable");
        let is_function = def.category == Category::Functions;
        let buf = if def.params.is_empty() && !is_function { "_buf" } else { "buf" };
        let body = format!("{indent}        ");

        writeln!(out, "{indent}impl{bounded} Deserializable for {name}{plain} {{")?;
        writeln!(
            out,
            "{indent}    fn deserialize({buf}: crate::deserialize::Buffer) -> crate::deserialize::Result<Self> {{"
        )?;
        if is_function {
            writeln!(out, "{body}let id = u32::deserialize(buf)?;")?;
            writeln!(out, "{body}if id != Self::CONSTRUCTOR_ID {{")?;
            writeln!(
                out,
                "{body}    return Err(buf.fail(crate::deserialize::Error::UnexpectedConstructor {{ id }}));"
            )?;
            writeln!(out, "{body}}}")?;
        }

        for param in &def.params {
            let attr = n::param_attr_name(param);
            match &param.ty {
                ParameterType::Flags => {
                    let unused = if Metadata::is_unused_flag(def, param) { "_" } else { "" };
                    writeln!(out, "{body}let {unused}{} = u32::deserialize(buf)?;", param.name)?;
                }
                ParameterType::Normal { ty, flag: Some(flag) } if is_bool_flag(ty) => {
                    writeln!(out, "{body}let {attr} = ({} & (1 << {})) != 0;", flag.name, flag.index)?;
                }
                ParameterType::Normal { ty, flag: Some(flag) } => {
                    writeln!(
                        out,
                        "{body}let {attr} = if ({} & (1 << {})) != 0 {{ Some({}::deserialize(buf)?) }} else {{ None }};",
                        flag.name,
                        flag.index,
                        n::type_item_path(ty),
                    )?;
                }
                ParameterType::Normal { ty, flag: None } => {
                    writeln!(out, "{body}let {attr} = {}::deserialize(buf)?;", n::type_item_path(ty))?;
                }
            }
        }

        let fields: Vec<String> = def
            .params
            .iter()
            .filter(|p| p.ty != ParameterType::Flags)
            .map(n::param_attr_name)
            .collect();
        writeln!(out, "{body}Ok(Self {{ {} }})", fields.join(", "))?;
        writeln!(out, "{indent}    }}")?;
        writeln!(out, "{indent}}}")
    }

    fn enums_mod<W: Write>(&self, out: &mut W, defs: &[Definition]) -> io::Result<()> {
        writeln!(out, "{HEADER}\n")?;
        writeln!(out, "pub mod enums {{")?;
        for line in PRELUDE.lines() {
            writeln!(out, "    {line}")?;
        }

        for (ns, types) in metadata::boxed_types_by_namespace(defs) {
            let indent = open_namespace(out, &ns)?;
            for ty in types {
                self.boxed_type(out, indent, ty)?;
            }
            close_namespace(out, &ns)?;
        }
        writeln!(out, "}}")
    }

    fn boxed_type<W: Write>(&self, out: &mut W, indent: &str, ty: &Type) -> io::Result<()> {
        let name = n::type_name(ty);
        let ctors = self.meta.constructors_of(ty);
        let body = format!("{indent}        ");

        writeln!(out, "\n{indent}/// Boxed `{ty}`.")?;
        self.derives(out, indent)?;
        writeln!(out, "{indent}pub enum {name} {{")?;
        for def in ctors {
            let variant = n::def_variant_name(def);
            let qual = n::def_qual_name(def);
            match (def.params.is_empty(), self.meta.is_recursive(def)) {
                (true, _) => writeln!(out, "{indent}    {variant},")?,
                (false, true) => writeln!(out, "{indent}    {variant}(Box<{qual}>),")?,
                (false, false) => writeln!(out, "{indent}    {variant}({qual}),")?,
            }
        }
        writeln!(out, "{indent}}}")?;

        writeln!(out, "{indent}impl Serializable for {name} {{")?;
        writeln!(out, "{indent}    fn serialize(&self, buf: &mut impl Extend<u8>) {{")?;
        writeln!(out, "{body}match self {{")?;
        for def in ctors {
            let variant = n::def_variant_name(def);
            if def.params.is_empty() {
                writeln!(out, "{body}    Self::{variant} => {:#010x}u32.serialize(buf),", def.id)?;
            } else {
                writeln!(out, "{body}    Self::{variant}(x) => {{")?;
                writeln!(out, "{body}        {:#010x}u32.serialize(buf);", def.id)?;
                writeln!(out, "{body}        x.serialize(buf);")?;
                writeln!(out, "{body}    }}")?;
            }
        }
        writeln!(out, "{body}}}")?;
        writeln!(out, "{indent}    }}")?;
        writeln!(out, "{indent}}}")?;

        writeln!(out, "{indent}impl Deserializable for {name} {{")?;
        writeln!(
            out,
            "{indent}    fn deserialize(buf: crate::deserialize::Buffer) -> crate::deserialize::Result<Self> {{"
        )?;
        writeln!(out, "{body}let id = u32::deserialize(buf)?;")?;
        writeln!(out, "{body}Ok(match id {{")?;
        for def in ctors {
            let variant = n::def_variant_name(def);
            let qual = n::def_qual_name(def);
            match (def.params.is_empty(), self.meta.is_recursive(def)) {
                (true, _) => writeln!(out, "{body}    {:#010x} => Self::{variant},", def.id)?,
                (false, true) => writeln!(
                    out,
                    "{body}    {:#010x} => Self::{variant}(Box::new({qual}::deserialize(buf)?)),",
                    def.id
                )?,
                (false, false) => {
                    writeln!(out, "{body}    {:#010x} => Self::{variant}({qual}::deserialize(buf)?),", def.id)?
                }
            }
        }
        writeln!(
            out,
            "{body}    _ => return Err(buf.fail(crate::deserialize::Error::UnexpectedConstructor {{ id }})),"
        )?;
        writeln!(out, "{body}}})")?;
        writeln!(out, "{indent}    }}")?;
        writeln!(out, "{indent}}}")?;

        if self.config.impl_from_type {
            self.from_impls(out, indent, ty)?;
        }
        if self.config.impl_from_enum {
            self.try_from_impls(out, indent, ty)?;
        }
        Ok(())
    }

    fn from_impls<W: Write>(&self, out: &mut W, indent: &str, ty: &Type) -> io::Result<()> {
        let name = n::type_name(ty);
        for def in self.meta.constructors_of(ty) {
            let variant = n::def_variant_name(def);
            let qual = n::def_qual_name(def);
            let value = match (def.params.is_empty(), self.meta.is_recursive(def)) {
                (true, _) => format!("Self::{variant}"),
                (false, true) => format!("Self::{variant}(Box::new(x))"),
                (false, false) => format!("Self::{variant}(x)"),
            };
            let arg = if def.params.is_empty() { "_x" } else { "x" };
            writeln!(out, "{indent}impl From<{qual}> for {name} {{")?;
            writeln!(out, "{indent}    fn from({arg}: {qual}) -> Self {{ {value} }}")?;
            writeln!(out, "{indent}}}")?;
        }
        Ok(())
    }

    fn try_from_impls<W: Write>(&self, out: &mut W, indent: &str, ty: &Type) -> io::Result<()> {
        let name = n::type_name(ty);
        let ctors = self.meta.constructors_of(ty);
        for def in ctors.iter().filter(|d| !d.params.is_empty()) {
            let variant = n::def_variant_name(def);
            let qual = n::def_qual_name(def);
            let unwrap = if self.meta.is_recursive(def) { "*x" } else { "x" };
            writeln!(out, "{indent}impl TryFrom<{name}> for {qual} {{")?;
            writeln!(out, "{indent}    type Error = {name};")?;
            writeln!(out, "{indent}    #[allow(unreachable_patterns)]")?;
            writeln!(out, "{indent}    fn try_from(value: {name}) -> Result<Self, Self::Error> {{")?;
            writeln!(out, "{indent}        match value {{")?;
            writeln!(out, "{indent}            {name}::{variant}(x) => Ok({unwrap}),")?;
            writeln!(out, "{indent}            other => Err(other),")?;
            writeln!(out, "{indent}        }}")?;
            writeln!(out, "{indent}    }}")?;
            writeln!(out, "{indent}}}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teleproto_tl_parser::parse_tl_file;

    fn render(src: &str, config: &Config) -> (String, String, String) {
        let defs: Vec<_> = parse_tl_file(src).collect::<Result<_, _>>().unwrap();
        let mut outputs = Outputs { common: Vec::new(), types: Vec::new(), functions: Vec::new(), enums: Vec::new() };
        generate(&defs, config, &mut outputs).unwrap();
        let text = |v: Vec<u8>| String::from_utf8(v).unwrap();
        assert!(text(outputs.common.clone()).contains(&format!("pub const LAYER: i32 = {};", config.layer)));
        (text(outputs.types), text(outputs.functions), text(outputs.enums))
    }

    #[test]
    fn flags_are_computed_and_read_in_order() {
        let (types, _, _) = render(
            "user#2e13f4c3 flags:# self:flags.10?true id:int username:flags.3?string = User;",
            &Config::default(),
        );
        assert!(types.contains("pub is_self: bool,"));
        assert!(types.contains("pub username: Option<String>,"));
        assert!(types.contains("if self.is_self { flags |= 1 << 10; }"));
        assert!(types.contains("let is_self = (flags & (1 << 10)) != 0;"));
        let flags_at = types.find("let flags = u32::deserialize").unwrap();
        let id_at = types.find("let id = i32::deserialize").unwrap();
        assert!(flags_at < id_at);
    }

    #[test]
    fn functions_check_their_id_when_deserializable() {
        let src = "---functions---\nping#7abe77ec ping_id:long = Pong;";
        let config = Config { deserializable_functions: true, layer: 72, ..Config::default() };
        let (_, functions, _) = render(src, &config);
        assert!(functions.contains("Self::CONSTRUCTOR_ID.serialize(buf);"));
        assert!(functions.contains("if id != Self::CONSTRUCTOR_ID {"));
        assert!(functions.contains("type Return = crate::enums::Pong;"));

        let (_, functions, _) = render(src, &Config::default());
        assert!(!functions.contains("impl Deserializable for Ping"));
    }

    #[test]
    fn enum_decoding_failure_is_sticky() {
        let (_, _, enums) = render(
            "storage.fileUnknown#aa963b05 = storage.FileType;\nstorage.filePng#a4f63c0 = storage.FileType;",
            &Config::default(),
        );
        assert!(enums.contains("pub mod storage {"));
        assert!(enums.contains("FileUnknown,"));
        assert!(enums.contains("return Err(buf.fail("));
    }

    #[test]
    fn generic_wrappers() {
        let (_, functions, _) = render(
            "---functions---\ninvokeWithLayer#da9b0d0d {X:Type} layer:int query:!X = X;",
            &Config::default(),
        );
        assert!(functions.contains("pub struct InvokeWithLayer<X> {"));
        assert!(functions.contains("impl<X: Serializable + Deserializable> crate::RemoteCall for InvokeWithLayer<X> {"));
        assert!(functions.contains("type Return = X;"));
    }
}
