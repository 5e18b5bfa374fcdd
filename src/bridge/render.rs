//! Text rendering of language server results for tool callers.

use std::fmt::Write;

use crate::bridge::position::{display_path, to_one_based, FilePosition};
use crate::lsp::protocol::{
    Diagnostic, Hover, HoverContents, Location, MarkedString, Range, SymbolInformation,
};

/// Flatten hover contents to plain text, fragments joined by newlines.
pub fn hover_text(contents: &HoverContents) -> String {
    match contents {
        HoverContents::Markup(markup) => markup.value.clone(),
        HoverContents::Scalar(marked) => marked_string_text(marked).to_string(),
        HoverContents::Array(items) => items
            .iter()
            .map(marked_string_text)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn marked_string_text(marked: &MarkedString) -> &str {
    match marked {
        MarkedString::String(text) | MarkedString::LanguageString { value: text, .. } => text,
    }
}

pub fn location(uri: &str, range: &Range) -> String {
    let (line, column) = to_one_based(range.start);
    format!("{}:{line}:{column}", display_path(uri))
}

pub fn hover(hover: Option<&Hover>, target: &FilePosition) -> String {
    let text = hover.map(|hover| hover_text(&hover.contents)).unwrap_or_default();
    if text.trim().is_empty() {
        return format!("No symbol information found at {target}");
    }
    text
}

pub fn definitions(locations: &[Location], target: &FilePosition) -> String {
    if locations.is_empty() {
        return format!("No definition found for the symbol at {target}");
    }
    if let [only] = locations {
        return format!("Definition: {}", location(&only.uri, &only.range));
    }

    let mut output = format!("Found {} definitions for the symbol at {target}:\n", locations.len());
    for (i, loc) in locations.iter().enumerate() {
        let _ = writeln!(output, "{}. {}", i + 1, location(&loc.uri, &loc.range));
    }
    output.truncate(output.trim_end().len());
    output
}

pub fn references(locations: &[Location], target: &FilePosition) -> String {
    if locations.is_empty() {
        return format!("No references found for the symbol at {target}");
    }

    let mut output = format!("Found {} reference(s) to the symbol at {target}:\n", locations.len());
    for (i, loc) in locations.iter().enumerate() {
        let _ = writeln!(output, "{}. {}", i + 1, location(&loc.uri, &loc.range));
    }
    output.truncate(output.trim_end().len());
    output
}

pub fn workspace_symbols(symbols: &[SymbolInformation], query: &str) -> String {
    if symbols.is_empty() {
        return format!("No symbols found matching '{query}'");
    }

    let mut output = format!("Found {} symbol(s) matching '{query}':\n", symbols.len());
    for (i, symbol) in symbols.iter().enumerate() {
        let place = match &symbol.location.range {
            Some(range) => location(&symbol.location.uri, range),
            None => display_path(&symbol.location.uri),
        };
        let _ = write!(output, "{}. {} ({}) at {place}", i + 1, symbol.name, symbol.kind.label());
        if let Some(container) = symbol.container_name.as_deref().filter(|c| !c.is_empty()) {
            let _ = write!(output, " in {container}");
        }
        output.push('\n');
    }
    output.truncate(output.trim_end().len());
    output
}

pub fn diagnostics(diagnostics: &[Diagnostic], path: &str) -> String {
    if diagnostics.is_empty() {
        return format!("No diagnostics reported for {path}");
    }

    let mut output = format!("Found {} diagnostic(s) in {path}:\n", diagnostics.len());
    for (i, diagnostic) in diagnostics.iter().enumerate() {
        let (line, column) = to_one_based(diagnostic.range.start);
        let severity = diagnostic.severity.map_or("unknown", |severity| severity.label());
        let _ = write!(output, "{}. [{severity}] {line}:{column} {}", i + 1, diagnostic.message);
        if let Some(source) = diagnostic.source.as_deref() {
            let _ = write!(output, " ({source})");
        }
        output.push('\n');
    }
    output.truncate(output.trim_end().len());
    output
}
