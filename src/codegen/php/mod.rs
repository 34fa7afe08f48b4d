//! PHP code generator
//!
//! Renders the `Tbl` registry class and one `Tbl<Table>` class per table.
//! All PHP syntax lives in the templates of this module.

use std::collections::{BTreeMap, HashMap};

use minijinja::{context, Environment};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::codegen::{Artifact, CodeGenConfig, CodeGenerator, OutputMode, RenderInput};
use crate::error::DbTblError;
use crate::naming::{NameScope, NamingResolver, NamingStrategy};
use crate::schema::{ForeignKey, TableDescriptor};

/// Class holding one constant per table
pub const REGISTRY_CLASS: &str = "Tbl";

/// File of the registry class in PSR4 mode
pub const REGISTRY_FILE: &str = "Tbl.php";

/// A `public const NAME = 'value';` line; `value` is already escaped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Constant {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumGroup {
    pub column: String,
    pub constants: Vec<Constant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKeyConstant {
    pub name: String,
    pub value: String,
    pub to_table: String,
    pub to_column: String,
}

/// Everything needed to render the class of one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableClass {
    pub table: String,
    pub table_doc: String,
    pub table_value: String,
    pub alias: String,
    pub alias_value: String,
    pub class_name: String,
    pub file_name: String,
    pub columns: Vec<Constant>,
    pub enum_groups: Vec<EnumGroup>,
    pub foreign_keys: Vec<ForeignKeyConstant>,
}

impl TableClass {
    /// Resolve every constant of `table`.
    ///
    /// Only foreign keys leaving `table` are used. Two constants resolving to
    /// the same name fail with `NamingCollision`.
    pub fn build(
        table: &TableDescriptor,
        foreign_keys: &[ForeignKey],
        naming: &NamingResolver,
    ) -> Result<Self, DbTblError> {
        let class_name = naming.class_name(&table.name);
        let alias = naming.table_alias(&table.name);
        let mut scope = NameScope::new(format!("class {}", class_name));
        scope.claim("__table", "the table name constant")?;
        scope.claim("__alias", "the table alias constant")?;

        let mut columns = Vec::with_capacity(table.columns.len());
        for column in &table.columns {
            let name = naming.column_const_name(column);
            scope.claim(&name, &format!("column `{}`", column))?;
            columns.push(Constant {
                name,
                value: php_string(column),
            });
        }

        let mut enum_groups = Vec::new();
        for (column, values) in table.enum_groups() {
            let mut constants = Vec::with_capacity(values.len());
            for value in values {
                let name = naming.enum_const_name(&value.key());
                scope.claim(&name, &format!("enum value `{}` of `{}`", value.value, column))?;
                constants.push(Constant {
                    name,
                    value: php_string(&value.value),
                });
            }
            enum_groups.push(EnumGroup {
                column: comment_text(column),
                constants,
            });
        }

        let outgoing: Vec<&ForeignKey> = foreign_keys
            .iter()
            .filter(|fk| fk.from_table == table.name)
            .collect();

        let mut per_target: BTreeMap<&str, usize> = BTreeMap::new();
        for fk in &outgoing {
            *per_target.entry(fk.to_table.as_str()).or_default() += 1;
        }

        let mut fks = Vec::with_capacity(outgoing.len());
        for fk in outgoing {
            let mut name = naming.foreign_key_const_name(&fk.to_table, false);
            if per_target.get(fk.to_table.as_str()).copied().unwrap_or(0) > 1 {
                name = format!("{}_{}", name, naming.column_const_name(&fk.from_column));
            }
            scope.claim(
                &name,
                &format!("foreign key `{}` → `{}`", fk.from_column, fk.to_table),
            )?;
            fks.push(ForeignKeyConstant {
                name,
                value: php_string(&fk.from_column),
                to_table: comment_text(&fk.to_table),
                to_column: comment_text(&fk.to_column),
            });
        }

        Ok(Self {
            table: table.name.clone(),
            table_doc: comment_text(&table.name),
            table_value: php_string(&table.name),
            alias_value: php_string(&format!("{} {}", table.name, alias)),
            alias,
            file_name: naming.class_file_name(&table.name),
            class_name,
            columns,
            enum_groups,
            foreign_keys: fks,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct RegistryEntry {
    name: String,
    value: String,
    alias_value: String,
}

/// PHP renderer
pub struct PhpRenderer {
    env: Environment<'static>,
    naming: NamingResolver,
    mode: OutputMode,
    namespace: Option<String>,
    output_file: String,
}

impl PhpRenderer {
    pub fn new(config: &CodeGenConfig) -> Result<Self, DbTblError> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_keep_trailing_newline(true);

        // Register templates
        for (name, source) in [
            ("registry", include_str!("templates/registry.php.jinja")),
            ("table", include_str!("templates/table.php.jinja")),
            ("file", include_str!("templates/file.php.jinja")),
            ("psr4_class", include_str!("templates/psr4_class.php.jinja")),
            ("psr4_registry", include_str!("templates/psr4_registry.php.jinja")),
        ] {
            env.add_template(name, source)
                .map_err(|e| template_error(name, e))?;
        }

        Ok(Self {
            env,
            naming: NamingResolver::new(config.naming.clone())?,
            mode: config.output_mode,
            namespace: config.namespace.clone(),
            output_file: config.output_file.clone(),
        })
    }

    pub fn naming(&self) -> &NamingResolver {
        &self.naming
    }

    /// Render the class block of a single table (no file header)
    pub fn render_table(
        &self,
        table: &TableDescriptor,
        foreign_keys: &[ForeignKey],
    ) -> Result<String, DbTblError> {
        let class = TableClass::build(table, foreign_keys, &self.naming)?;
        self.render_template("table", &table.name, context! { tbl => class })
    }

    fn build_classes(&self, input: &RenderInput<'_>) -> Result<Vec<TableClass>, DbTblError> {
        let mut class_scope = NameScope::case_insensitive("classes");
        class_scope.claim(REGISTRY_CLASS, "the table registry")?;

        let mut aliases: HashMap<String, &str> = HashMap::new();
        let mut classes = Vec::with_capacity(input.tables.len());

        for table in input.tables {
            let class = TableClass::build(table, input.foreign_keys, &self.naming)?;
            class_scope.claim(&class.class_name, &format!("table `{}`", table.name))?;

            if let Some(other) = aliases.insert(class.alias.clone(), &table.name) {
                warn!(
                    alias = ?class.alias,
                    first = ?other,
                    second = ?table.name,
                    "Tables share an alias"
                );
            }

            debug!(table = ?table.name, class = ?class.class_name, "Resolved table class");
            classes.push(class);
        }

        Ok(classes)
    }

    fn build_registry(&self, tables: &[TableDescriptor]) -> Result<Vec<RegistryEntry>, DbTblError> {
        let mut scope = NameScope::new(format!("class {}", REGISTRY_CLASS));
        let mut entries = Vec::with_capacity(tables.len());

        for table in tables {
            let name = self
                .naming
                .table_const_name(&table.name, NamingStrategy::Full);
            let source = format!("table `{}`", table.name);
            scope.claim(&name, &source)?;
            scope.claim(&format!("as_{}", name), &source)?;

            let alias = self.naming.table_alias(&table.name);
            entries.push(RegistryEntry {
                name,
                value: php_string(&table.name),
                alias_value: php_string(&format!("{} {}", table.name, alias)),
            });
        }

        Ok(entries)
    }

    fn render_file(
        &self,
        input: &RenderInput<'_>,
        classes: &[TableClass],
        registry: &[RegistryEntry],
        file_name: &str,
    ) -> Result<Vec<Artifact>, DbTblError> {
        let contents = self.render_template(
            "file",
            file_name,
            context! {
                schema_hash => input.schema_hash,
                generated_at => input.generated_at,
                namespace => self.namespace.as_deref(),
                registry => registry,
                classes => classes,
            },
        )?;

        Ok(vec![Artifact {
            file_name: file_name.to_string(),
            contents,
        }])
    }

    fn render_psr4(
        &self,
        input: &RenderInput<'_>,
        classes: &[TableClass],
        registry: &[RegistryEntry],
    ) -> Result<Vec<Artifact>, DbTblError> {
        let namespace = self.namespace.as_deref().ok_or_else(|| {
            DbTblError::Config("PSR-4 output requires \"output.namespace\" to be set.".to_string())
        })?;

        let mut artifacts = Vec::with_capacity(classes.len() + 1);
        for class in classes {
            let contents = self.render_template(
                "psr4_class",
                &class.table,
                context! { namespace => namespace, tbl => class },
            )?;
            artifacts.push(Artifact {
                file_name: class.file_name.clone(),
                contents,
            });
        }

        // Registry last: it carries the hash
        let contents = self.render_template(
            "psr4_registry",
            REGISTRY_CLASS,
            context! {
                namespace => namespace,
                database => comment_text(input.database),
                schema_hash => input.schema_hash,
                generated_at => input.generated_at,
                registry => registry,
            },
        )?;
        artifacts.push(Artifact {
            file_name: REGISTRY_FILE.to_string(),
            contents,
        });

        Ok(artifacts)
    }

    fn render_template(
        &self,
        name: &str,
        subject: &str,
        ctx: minijinja::Value,
    ) -> Result<String, DbTblError> {
        let template = self
            .env
            .get_template(name)
            .map_err(|e| template_error(subject, e))?;

        template.render(ctx).map_err(|e| DbTblError::CodeGen {
            table: subject.to_string(),
            message: format!("Render error: {}", e),
        })
    }
}

impl CodeGenerator for PhpRenderer {
    fn render(&self, input: &RenderInput<'_>) -> Result<Vec<Artifact>, DbTblError> {
        let classes = self.build_classes(input)?;
        let registry = self.build_registry(input.tables)?;

        let artifacts = match self.mode {
            OutputMode::File => self.render_file(input, &classes, &registry, &self.output_file)?,
            OutputMode::Psr4 => self.render_psr4(input, &classes, &registry)?,
        };

        info!(
            mode = %self.mode,
            artifacts = artifacts.len(),
            "Rendered PHP"
        );
        Ok(artifacts)
    }
}

fn template_error(subject: &str, e: minijinja::Error) -> DbTblError {
    DbTblError::CodeGen {
        table: subject.to_string(),
        message: format!("Template error: {}", e),
    }
}

/// Escape text for a single-quoted PHP string
pub fn php_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Make text safe inside a one-line comment or doc comment
pub fn comment_text(value: &str) -> String {
    value
        .replace("*/", "*\\/")
        .replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::schema::EnumValue;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn users() -> TableDescriptor {
        TableDescriptor::new("users", cols(&["id", "email", "status"])).with_enums(vec![
            EnumValue::new("status", "active"),
            EnumValue::new("status", "banned"),
        ])
    }

    fn orders() -> TableDescriptor {
        TableDescriptor::new("orders", cols(&["id", "user_id", "total"]))
    }

    fn shop_fks() -> Vec<ForeignKey> {
        vec![ForeignKey::new("orders", "user_id", "users", "id")]
    }

    fn renderer(config: CodeGenConfig) -> PhpRenderer {
        PhpRenderer::new(&config).unwrap()
    }

    fn file_renderer() -> PhpRenderer {
        renderer(CodeGenConfig::new(PathBuf::from("out")))
    }

    fn psr4_renderer() -> PhpRenderer {
        renderer(
            CodeGenConfig::new(PathBuf::from("out"))
                .with_output_mode(OutputMode::Psr4)
                .with_namespace("App\\Schema"),
        )
    }

    fn input<'a>(tables: &'a [TableDescriptor], fks: &'a [ForeignKey]) -> RenderInput<'a> {
        RenderInput {
            database: "shop",
            tables,
            foreign_keys: fks,
            schema_hash: "abc123",
            generated_at: "2024-01-02 03:04:05",
        }
    }

    const USERS_CLASS: &str = "/** `table: users` (alias: `u`) */
final class TblUsers
{
    public const __table = 'users';
    public const __alias = 'users u';

    public const id = 'id';
    public const email = 'email';
    public const status = 'status';

    // enum: status
    public const enum_status_active = 'active';
    public const enum_status_banned = 'banned';
}
";

    const ORDERS_CLASS: &str = "/** `table: orders` (alias: `o`) */
final class TblOrders
{
    public const __table = 'orders';
    public const __alias = 'orders o';

    public const id = 'id';
    public const user_id = 'user_id';
    public const total = 'total';

    /** references `users` → `id` */
    public const fk_user = 'user_id';
}
";

    const REGISTRY: &str = "final class Tbl
{
    public const orders = 'orders';
    public const users = 'users';

    // Table aliases
    public const as_orders = 'orders o';
    public const as_users = 'users u';
}
";

    #[test]
    fn test_render_table_with_enums() {
        let rendered = file_renderer().render_table(&users(), &shop_fks()).unwrap();
        assert_eq!(rendered, USERS_CLASS);
    }

    #[test]
    fn test_render_table_with_foreign_key() {
        let rendered = file_renderer().render_table(&orders(), &shop_fks()).unwrap();
        assert_eq!(rendered, ORDERS_CLASS);
    }

    #[test]
    fn test_foreign_key_only_in_referencing_table() {
        let renderer = file_renderer();
        let users = TableClass::build(&users(), &shop_fks(), renderer.naming()).unwrap();
        let orders = TableClass::build(&orders(), &shop_fks(), renderer.naming()).unwrap();

        assert!(users.foreign_keys.is_empty());
        assert_eq!(orders.foreign_keys.len(), 1);
        assert_eq!(orders.foreign_keys[0].to_table, "users");
        assert_eq!(orders.foreign_keys[0].to_column, "id");
    }

    #[test]
    fn test_render_table_without_columns() {
        let table = TableDescriptor::new("audit_log", Vec::new());
        let rendered = file_renderer().render_table(&table, &[]).unwrap();
        assert_eq!(
            rendered,
            "/** `table: audit_log` (alias: `al`) */
final class TblAuditLog
{
    public const __table = 'audit_log';
    public const __alias = 'audit_log al';
}
"
        );
    }

    #[test]
    fn test_render_file_mode() {
        let tables = vec![orders(), users()];
        let fks = shop_fks();
        let artifacts = file_renderer().render(&input(&tables, &fks)).unwrap();

        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].file_name, "Tbl.php");

        let expected = format!(
            "<?php

/**
 * Database table constants
 *
 * @schema-hash md5:abc123
 * @generated   2024-01-02 03:04:05
 * @tool        dbtbl
 *
 * AUTO-GENERATED FILE - DO NOT EDIT
 */

{}
{}
{}
// end of auto-generated file
",
            REGISTRY, ORDERS_CLASS, USERS_CLASS
        );
        assert_eq!(artifacts[0].contents, expected);
    }

    #[test]
    fn test_render_file_mode_with_namespace() {
        let renderer = renderer(
            CodeGenConfig::new(PathBuf::from("out"))
                .with_namespace("App\\Db")
                .with_output_file("Schema.php"),
        );
        let tables = vec![users()];
        let artifacts = renderer.render(&input(&tables, &[])).unwrap();

        assert_eq!(artifacts[0].file_name, "Schema.php");
        assert!(artifacts[0]
            .contents
            .contains(" */\n\nnamespace App\\Db;\n\nfinal class Tbl\n"));
    }

    #[test]
    fn test_render_psr4_mode() {
        let renderer = renderer(
            CodeGenConfig::new(PathBuf::from("out"))
                .with_output_mode(OutputMode::Psr4)
                .with_namespace("App\\Schema"),
        );
        let tables = vec![orders(), users()];
        let fks = shop_fks();
        let artifacts = renderer.render(&input(&tables, &fks)).unwrap();

        let names: Vec<_> = artifacts.iter().map(|a| a.file_name.as_str()).collect();
        assert_eq!(names, ["TblOrders.php", "TblUsers.php", "Tbl.php"]);

        assert_eq!(
            artifacts[1].contents,
            format!("<?php\n\nnamespace App\\Schema;\n\n{}", USERS_CLASS)
        );

        let registry = &artifacts[2].contents;
        assert!(registry.starts_with("<?php\n\nnamespace App\\Schema;\n\n/**\n"));
        assert!(registry.contains(" * Database schema mapping for \"shop\"\n"));
        assert!(registry.contains(" * @schema-hash md5:abc123\n"));
        assert!(registry.ends_with(&format!(" */\n\n{}", REGISTRY)));
    }

    #[test]
    fn test_duplicate_foreign_keys_get_column_suffix() {
        let table = TableDescriptor::new("posts", cols(&["id", "created_by", "updated_by"]));
        let fks = vec![
            ForeignKey::new("posts", "created_by", "users", "id"),
            ForeignKey::new("posts", "updated_by", "users", "id"),
        ];
        let class = TableClass::build(&table, &fks, file_renderer().naming()).unwrap();

        let names: Vec<_> = class.foreign_keys.iter().map(|fk| fk.name.as_str()).collect();
        assert_eq!(names, ["fk_user_created_by", "fk_user_updated_by"]);
    }

    #[test]
    fn test_column_collision_is_rejected() {
        let table = TableDescriptor::new("events", cols(&["user-id", "user_id"]));
        let err = TableClass::build(&table, &[], file_renderer().naming()).unwrap_err();

        match err {
            DbTblError::NamingCollision { scope, name, .. } => {
                assert_eq!(scope, "class TblEvents");
                assert_eq!(name, "user_id");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_reserved_constant_collision_is_rejected() {
        let table = TableDescriptor::new("events", cols(&["id", "__table"]));
        let err = TableClass::build(&table, &[], file_renderer().naming()).unwrap_err();
        assert!(matches!(err, DbTblError::NamingCollision { .. }));
    }

    #[test]
    fn test_class_collision_is_rejected() {
        let tables = vec![
            TableDescriptor::new("order-items", cols(&["id"])),
            TableDescriptor::new("order_items", cols(&["id"])),
        ];
        let err = file_renderer().render(&input(&tables, &[])).unwrap_err();

        match err {
            DbTblError::NamingCollision { scope, name, .. } => {
                assert_eq!(scope, "classes");
                assert_eq!(name, "TblOrderItems");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_class_collision_ignores_case() {
        let tables = vec![
            TableDescriptor::new("user_roles", cols(&["id"])),
            TableDescriptor::new("userroles", cols(&["id"])),
        ];

        for renderer in [file_renderer(), psr4_renderer()] {
            let err = renderer.render(&input(&tables, &[])).unwrap_err();
            match err {
                DbTblError::NamingCollision { scope, name, first, second } => {
                    assert_eq!(scope, "classes");
                    assert_eq!(name, "TblUserroles");
                    assert_eq!(first, "table `user_roles` as TblUserRoles");
                    assert_eq!(second, "table `userroles`");
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn test_values_are_escaped() {
        let table = TableDescriptor::new("notes", cols(&["body"]))
            .with_enums(vec![EnumValue::new("body", "it's")]);
        let rendered = file_renderer().render_table(&table, &[]).unwrap();

        assert!(rendered.contains("public const enum_body_it_s = 'it\\'s';"));
    }

    #[test]
    fn test_psr4_without_namespace_fails() {
        let renderer = renderer(
            CodeGenConfig::new(PathBuf::from("out")).with_output_mode(OutputMode::Psr4),
        );
        let tables = vec![users()];
        let err = renderer.render(&input(&tables, &[])).unwrap_err();
        assert!(matches!(err, DbTblError::Config(_)));
    }

    #[test]
    fn test_php_string() {
        assert_eq!(php_string("plain"), "plain");
        assert_eq!(php_string("it's"), "it\\'s");
        assert_eq!(php_string("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_comment_text() {
        assert_eq!(comment_text("a*/b"), "a*\\/b");
        assert_eq!(comment_text("line\nbreak"), "line break");
    }
}
