use std::fmt::Write;

use crate::sandbox::context::BINDING_DOCS;
use crate::script::builtins::{BUILTINS, METHODS};

use super::Registry;

/// Generate a markdown table of built-in functions, grouped by category.
fn builtin_functions_table() -> String {
    let mut out = String::new();
    out.push_str("## Built-in Functions\n\n");

    let categories: &[(&str, &str)] = &[
        ("primitive", "Primitives"),
        ("utility", "Utilities"),
        ("time", "Time Helpers"),
    ];

    for &(cat_key, cat_title) in categories {
        let fns: Vec<_> = BUILTINS.iter().filter(|b| b.category == cat_key).collect();
        if fns.is_empty() {
            continue;
        }

        let _ = writeln!(out, "### {cat_title}");
        out.push_str("| Function | Description |\n");
        out.push_str("|----------|-------------|\n");
        for f in &fns {
            let _ = writeln!(out, "| `{}({})` | {} |", f.name, f.params, f.description);
        }
        out.push('\n');
    }

    let _ = writeln!(
        out,
        "Methods: `xs.{}(...)` are shorthand for the function with `xs` as the first argument.\n",
        METHODS.join("(...)`, `xs.")
    );
    out
}

/// Generate a markdown table of the read-only context bindings.
fn bindings_table() -> String {
    let mut out = String::new();
    out.push_str("## Predefined Values (read-only)\n");
    out.push_str("| Name | Type | Description |\n");
    out.push_str("|------|------|-------------|\n");
    for (name, ty, desc) in BINDING_DOCS {
        let _ = writeln!(out, "| `{name}` | {ty} | {desc} |");
    }
    out.push('\n');
    out
}

/// Generate a markdown table of the tools callable from a script.
fn tools_table(registry: &Registry) -> String {
    let mut out = String::new();
    out.push_str("## Tools\n");
    out.push_str("Tools take positional arguments in the order shown or named ones \
                  (`create_segment(0, 1.0, 2.0, color=\"red\")`). `?` marks optional.\n\n");
    out.push_str("| Call | Mutates | Description |\n");
    out.push_str("|------|---------|-------------|\n");
    for c in registry.iter() {
        let info = c.info();
        let _ = writeln!(
            out,
            "| `{}` | {} | {} |",
            c.signature().display(info.name),
            if info.mutates { "yes" } else { "no" },
            info.description,
        );
    }
    out.push('\n');
    out
}

/// Generate the complete script language reference from the actual implementation.
pub fn script_reference(registry: &Registry) -> String {
    let mut out = String::new();

    // ── Hand-written sections ───────────────────────────────────
    out.push_str(r#"# Script Reference

Scripts run top to bottom. Blocks follow `:` and are indented, or are wrapped
in `{ }`; a single statement may follow the `:` on the same line.

```
# comment
colors = [color("red"), color("blue")]
for i in 0..NUM_BALLS:
    c = colors[i % len(colors)]
    for b in beats_between(0, 8):
        create_segment(i, b, b + 0.25, c)

def pulse(ball, start, n):
    t = start
    while n > 0:
        create_segment(ball, t, t + 0.1, [255, 255, 255])
        t += 0.5
        n -= 1
    return t

if TEMPO != None and TEMPO > 120: pulse(0, 0, 8)
elif len(SECTIONS) > 0: log("sections:", len(SECTIONS))
else: pass
```

## Values
- `int`, `float`, `bool` (`true`/`True`), `null` (`None`), `string` (`"..."` or `'...'`)
- lists `[1, 2, 3]`, maps `{"label": "verse", start: 0.0}`
- colors are lists `[r, g, b]` with integers 0-255; tools also accept names and `#rrggbb`
- `xs[i]` indexes lists and strings (negative counts from the end); `m["k"]` or `m.k` reads maps

## Operators
| Operator | Description |
|----------|-------------|
| `+ - * /` | Arithmetic; `/` always gives a float. `+` also joins strings and lists |
| `//`, `%` | Floor division and modulo (result takes the divisor's sign) |
| `**` | Power; binds tighter than unary `-` |
| `== != < <= > >=` | Comparison |
| `and`/`&&`, `or`/`\|\|`, `not`/`!` | Logic; `and`/`or` return an operand |
| `in` | Membership in a list, map keys or string |
| `a..b` | Integers from `a` up to, not including, `b` |
| `= += -= *= /= %=` | Assignment |

## Control Flow
`if` / `elif` / `else`, `while`, `for x in <list, map, string or range>`,
`break`, `continue`, `pass`, `def name(params):` with `return`. Functions
are defined at the top level and may be called before their definition.
Names assigned inside a function are local to it.

## Not Available
`import`, classes, `try`, `lambda` and names starting with `_`. Predefined
values and tool names cannot be reassigned. Every name must be defined;
unknown names are rejected before the script runs, so a failed compile
changes nothing.

## Limits
A run is stopped after its time limit (5 seconds by default) or operation
budget and reports `TimeoutError`. Changes made before a failure are kept.
Recursion depth, list and string sizes, and captured log lines are capped.

"#);

    // ── Auto-generated sections ─────────────────────────────────
    out.push_str(&bindings_table());
    out.push_str(&tools_table(registry));
    out.push_str(&builtin_functions_table());

    out.push_str(r"## Errors
A failed run reports one of `CompilationError`, `TimeoutError`,
`CapabilityError` (a tool rejected its arguments), `UndefinedReference`,
`TypeMismatch`, `InvalidValue` or `RuntimeFault`, with the line and column.
");

    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::sandbox::context::BINDING_NAMES;

    #[test]
    fn reference_covers_every_builtin_tool_and_binding() {
        let registry = Registry::standard();
        let text = script_reference(&registry);
        for b in BUILTINS {
            assert!(text.contains(&format!("`{}(", b.name)), "missing builtin {}", b.name);
        }
        for c in registry.iter() {
            assert!(text.contains(&c.signature().display(c.name())), "missing tool {}", c.name());
        }
        for name in BINDING_NAMES {
            assert!(text.contains(&format!("`{name}`")), "missing binding {name}");
        }
    }

    #[test]
    fn sample_program_compiles() {
        let registry = Registry::standard();
        let text = script_reference(&registry);
        let start = text.find("```\n").unwrap() + 4;
        let end = start + text[start..].find("```").unwrap();
        let env = crate::script::Environment::new(registry.names(), BINDING_NAMES);
        let program = crate::script::compile_source(&text[start..end], &env);
        assert!(program.is_ok(), "{:?}", program.err());
    }
}
