//! Page scripts evaluated by the Chrome backend
//!
//! Every script is an IIFE returning `JSON.stringify(...)`, so the result
//! always comes back as a string primitive. Locators and parameters are
//! embedded as JSON literals.

use pagecheck_core::{Locator, PageCheckError, Result};
use serde::Serialize;

/// Shared prelude: `spec`, `textOf`, `find()`
const FIND_PRELUDE: &str = r#"
  const textOf = (el) => ((el.innerText ?? el.textContent) || '').trim();
  const skipped = new Set(['SCRIPT', 'STYLE', 'NOSCRIPT', 'TEMPLATE', 'HEAD', 'HTML']);
  const find = () => {
    const root = spec.scope ? document.querySelector(spec.scope) : document;
    if (!root) { return []; }
    const sel = spec.selector;
    switch (sel.kind) {
      case 'css':
        return Array.from(root.querySelectorAll(sel.css));
      case 'css_text':
        return Array.from(root.querySelectorAll(sel.css))
          .filter((el) => textOf(el).includes(sel.text));
      case 'attribute':
        return Array.from(root.querySelectorAll(sel.css)).filter((el) => {
          const value = el.getAttribute(sel.name);
          if (value === null) { return false; }
          return sel.mode === 'contains' ? value.includes(sel.value) : value === sel.value;
        });
      case 'text': {
        const hits = Array.from(root.querySelectorAll('*'))
          .filter((el) => !skipped.has(el.tagName) && textOf(el).includes(sel.text));
        return hits.filter((el) =>
          !Array.from(el.children).some((child) => textOf(child).includes(sel.text)));
      }
      default:
        return [];
    }
  };
"#;

fn json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(PageCheckError::from)
}

fn with_locator(locator: &Locator, body: &str) -> Result<String> {
    Ok(format!(
        "(() => {{\n  const spec = {};\n{}\n{}\n}})()",
        json(locator)?,
        FIND_PRELUDE,
        body
    ))
}

/// Element snapshots for every match
pub fn query(locator: &Locator) -> Result<String> {
    with_locator(
        locator,
        r#"
  return JSON.stringify(find().map((el, index) => {
    const rect = el.getBoundingClientRect();
    const style = window.getComputedStyle(el);
    return {
      index,
      tag: el.tagName.toLowerCase(),
      text: textOf(el),
      visible: rect.width > 0 && rect.height > 0
        && style.visibility !== 'hidden' && style.display !== 'none',
      bounds: {
        x: rect.left + window.scrollX,
        y: rect.top + window.scrollY,
        width: rect.width,
        height: rect.height,
      },
    };
  }));"#,
    )
}

/// Attribute value of one match, or null
pub fn attribute(locator: &Locator, index: usize, name: &str) -> Result<String> {
    with_locator(
        locator,
        &format!(
            r#"
  const el = find()[{}];
  return JSON.stringify(el ? el.getAttribute({}) : null);"#,
            index,
            json(name)?
        ),
    )
}

/// Set an input/textarea value through the native setter so framework
/// listeners see the change. Returns whether the element existed.
pub fn set_value(locator: &Locator, index: usize, value: &str) -> Result<String> {
    with_locator(
        locator,
        &format!(
            r#"
  const el = find()[{}];
  if (!el) {{ return JSON.stringify(false); }}
  el.scrollIntoView({{ block: 'center' }});
  el.focus();
  const proto = Object.getPrototypeOf(el);
  const setter = Object.getOwnPropertyDescriptor(proto, 'value')?.set;
  if (setter) {{ setter.call(el, {value}); }} else {{ el.value = {value}; }}
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  el.dispatchEvent(new Event('change', {{ bubbles: true }}));
  return JSON.stringify(true);"#,
            index,
            value = json(value)?
        ),
    )
}

/// Select an option by value or visible label.
/// Returns `{ found, selected }`.
pub fn select_option(locator: &Locator, index: usize, option: &str) -> Result<String> {
    with_locator(
        locator,
        &format!(
            r#"
  const el = find()[{}];
  const wanted = {};
  if (!el) {{ return JSON.stringify({{ found: false, selected: false }}); }}
  const options = Array.from(el.options || []);
  const match = options.find((o) => o.value === wanted)
    || options.find((o) => (o.label || o.text).trim() === wanted);
  if (!match) {{ return JSON.stringify({{ found: true, selected: false }}); }}
  el.value = match.value;
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  el.dispatchEvent(new Event('change', {{ bubbles: true }}));
  return JSON.stringify({{ found: true, selected: true }});"#,
            index,
            json(option)?
        ),
    )
}

/// Activate one match. Returns whether the element existed.
pub fn click(locator: &Locator, index: usize) -> Result<String> {
    with_locator(
        locator,
        &format!(
            r#"
  const el = find()[{}];
  if (!el) {{ return JSON.stringify(false); }}
  el.scrollIntoView({{ block: 'center' }});
  el.click();
  return JSON.stringify(true);"#,
            index
        ),
    )
}

pub fn scroll_to(viewports: f64) -> String {
    format!(
        "(() => {{ window.scrollTo(0, window.innerHeight * {}); return JSON.stringify(window.scrollY); }})()",
        viewports
    )
}

/// Full document size, used to clip full-page captures
pub const DOCUMENT_SIZE: &str = r#"(() => JSON.stringify({
  width: Math.max(document.documentElement.scrollWidth, document.body ? document.body.scrollWidth : 0),
  height: Math.max(document.documentElement.scrollHeight, document.body ? document.body.scrollHeight : 0),
}))()"#;

/// Document ready state, e.g. `"complete"`
pub const READY_STATE: &str = r#"JSON.stringify(document.readyState)"#;

/// Inventory of every `<img>`
pub const IMAGES: &str = r#"(() => JSON.stringify(Array.from(document.querySelectorAll('img')).map((img, index) => {
  const rect = img.getBoundingClientRect();
  const style = window.getComputedStyle(img);
  return {
    index,
    src: img.currentSrc || img.src || '',
    alt: img.getAttribute('alt'),
    visible: rect.width > 0 && rect.height > 0
      && style.visibility !== 'hidden' && style.display !== 'none',
    width: rect.width,
    height: rect.height,
    natural_width: img.naturalWidth,
    natural_height: img.naturalHeight,
  };
})))()"#;

#[cfg(test)]
mod tests {
    use super::*;
    use pagecheck_core::Selector;

    #[test]
    fn test_locator_is_embedded_as_json() {
        let locator = Locator::new(Selector::text("it's \"quoted\" </script>"));
        let script = query(&locator).unwrap();
        assert!(script.contains(r#"const spec = {"selector":{"kind":"text","text":"it's \"quoted\" </script>"}};"#));
        assert!(script.starts_with("(() => {"));
        assert!(script.ends_with("})()"));
    }

    #[test]
    fn test_scope_is_passed_through() {
        let locator = Locator::new(Selector::css("img")).within("section");
        let script = query(&locator).unwrap();
        assert!(script.contains(r#""scope":"section""#));
    }

    #[test]
    fn test_parameters_are_escaped() {
        let locator = Locator::new(Selector::css("textarea"));
        let script = set_value(&locator, 0, "line one\n'line two'").unwrap();
        assert!(script.contains(r#"setter.call(el, "line one\n'line two'")"#));
        assert!(script.contains("const el = find()[0];"));

        let script = attribute(&locator, 2, "placeholder").unwrap();
        assert!(script.contains(r#"el.getAttribute("placeholder")"#));
        assert!(script.contains("find()[2]"));
    }
}
