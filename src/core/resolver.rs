//! Configuration values that are either fixed at startup or computed from the
//! request context.
use std::{borrow::Cow, collections::BTreeMap, fmt, sync::Arc};

use url::form_urlencoded;

use crate::core::context::RequestContext;

pub type ResolverFn<V> = Arc<dyn Fn(&RequestContext) -> V + Send + Sync>;

/// Either a literal value or a per-request resolver.
pub enum Resolvable<V> {
    Static(V),
    Resolved(ResolverFn<V>),
}

impl<V> Resolvable<V> {
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&RequestContext) -> V + Send + Sync + 'static,
    {
        Self::Resolved(Arc::new(f))
    }
}

impl<V: Clone> Resolvable<V> {
    pub fn resolve(&self, ctx: &RequestContext) -> V {
        match self {
            Self::Static(value) => value.clone(),
            Self::Resolved(f) => f(ctx),
        }
    }
}

impl Resolvable<String> {
    /// A string with `{name}` placeholders filled from the path parameters,
    /// falling back to query parameters. Unknown placeholders become empty.
    ///
    /// Values are copied verbatim, so this suits query values and headers
    /// that are encoded later. Use [`Resolvable::url_template`] for URLs.
    pub fn template(template: impl Into<String>) -> Self {
        Self::encoded_template(template.into(), Encoding::Raw)
    }

    /// Like [`Resolvable::template`], but every substituted value is
    /// percent-encoded and cannot add path segments or query parameters.
    pub fn url_template(template: impl Into<String>) -> Self {
        Self::encoded_template(template.into(), Encoding::Url)
    }

    fn encoded_template(template: String, encoding: Encoding) -> Self {
        if !template.contains('{') {
            return Self::Static(template);
        }
        Self::from_fn(move |ctx| interpolate(&template, ctx, encoding).unwrap_or_default())
    }
}

impl<V: Clone> Clone for Resolvable<V> {
    fn clone(&self) -> Self {
        match self {
            Self::Static(value) => Self::Static(value.clone()),
            Self::Resolved(f) => Self::Resolved(f.clone()),
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for Resolvable<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Self::Resolved(_) => f.write_str("Resolved(<fn>)"),
        }
    }
}

impl<V> From<V> for Resolvable<V> {
    fn from(value: V) -> Self {
        Self::Static(value)
    }
}

impl From<&str> for Resolvable<String> {
    fn from(value: &str) -> Self {
        Self::Static(value.to_string())
    }
}

/// A mapping whose values may individually be resolvers.
pub type ParamMap = BTreeMap<String, Resolvable<String>>;

/// Query parameters or headers of a fragment request.
pub type Params = Resolvable<ParamMap>;

/// Build a static [`Params`] from literal pairs.
pub fn static_params<I, K, V>(pairs: I) -> Params
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    Resolvable::Static(
        pairs
            .into_iter()
            .map(|(k, v)| (k.into(), Resolvable::Static(v.into())))
            .collect(),
    )
}

/// Resolve the mapping itself, then every resolver-valued entry in it.
pub fn resolve_params(params: &Params, ctx: &RequestContext) -> BTreeMap<String, String> {
    params
        .resolve(ctx)
        .iter()
        .map(|(key, value)| (key.clone(), value.resolve(ctx)))
        .collect()
}

/// How substituted values are written into a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Raw,
    /// Percent-encode everything except ASCII alphanumerics and `*-._`.
    Url,
    /// Accept only values that name a single file; `/`, `\` and `..` are refused.
    PathSegment,
}

impl Encoding {
    fn apply(self, value: &str) -> Option<Cow<'_, str>> {
        match self {
            Self::Raw => Some(Cow::Borrowed(value)),
            // `+` only ever comes from a space; a literal plus is already `%2B`.
            Self::Url => Some(Cow::Owned(
                form_urlencoded::byte_serialize(value.as_bytes())
                    .collect::<String>()
                    .replace('+', "%20"),
            )),
            Self::PathSegment => is_single_segment(value).then_some(Cow::Borrowed(value)),
        }
    }
}

fn is_single_segment(value: &str) -> bool {
    !value.contains(['/', '\\', '\0']) && !value.contains("..")
}

/// Fill `{name}` placeholders from the context.
///
/// Returns `None` when a value is refused by `encoding`.
pub fn interpolate(template: &str, ctx: &RequestContext, encoding: Encoding) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                let value = ctx
                    .param(name)
                    .or_else(|| ctx.query_param(name))
                    .unwrap_or_default();
                out.push_str(&encoding.apply(value)?);
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(uri: &str, params: &[(&str, &str)]) -> RequestContext {
        let (parts, _) = http::Request::builder()
            .uri(uri)
            .body(())
            .unwrap()
            .into_parts();
        let params = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RequestContext::new(&parts, params)
    }

    #[test]
    fn test_static_and_resolved() {
        let ctx = ctx("/item/3?x=1", &[("id", "3")]);
        let fixed: Resolvable<String> = "literal".into();
        let computed = Resolvable::from_fn(|ctx| format!("id-{}", ctx.param("id").unwrap_or("?")));

        assert_eq!(fixed.resolve(&ctx), "literal");
        assert_eq!(computed.resolve(&ctx), "id-3");
    }

    #[test]
    fn test_resolve_params_runs_nested_resolvers() {
        let ctx = ctx("/search?term=rust", &[]);
        let mut map = ParamMap::new();
        map.insert("limit".into(), "5".into());
        map.insert(
            "term".into(),
            Resolvable::from_fn(|ctx| ctx.query_param("term").unwrap_or_default().to_uppercase()),
        );

        let resolved = resolve_params(&Resolvable::Static(map), &ctx);
        assert_eq!(resolved.get("limit").map(String::as_str), Some("5"));
        assert_eq!(resolved.get("term").map(String::as_str), Some("RUST"));
    }

    #[test]
    fn test_template_interpolation() {
        let ctx = ctx("/item/42?lang=en", &[("id", "42")]);
        let url = Resolvable::template("http://backend/items/{id}?lang={lang}&x={nope}");
        assert_eq!(url.resolve(&ctx), "http://backend/items/42?lang=en&x=");

        assert!(matches!(Resolvable::template("/plain"), Resolvable::Static(_)));
        assert_eq!(
            interpolate("unterminated {id", &ctx, Encoding::Raw).as_deref(),
            Some("unterminated {id")
        );
    }

    #[test]
    fn test_url_template_keeps_values_in_one_query_pair() {
        let ctx = ctx("/item?lang=en%26admin%3Dtrue", &[]);
        let resolved = Resolvable::url_template("http://backend/items?lang={lang}").resolve(&ctx);

        let url = url::Url::parse(&resolved).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![("lang".to_string(), "en&admin=true".to_string())]
        );
    }

    #[test]
    fn test_url_template_keeps_values_in_one_path_segment() {
        let ctx = ctx("/item", &[("id", "../admin/1?x=y#z")]);
        let resolved = Resolvable::url_template("http://backend/items/{id}").resolve(&ctx);

        let url = url::Url::parse(&resolved).unwrap();
        assert_eq!(url.path(), "/items/..%2Fadmin%2F1%3Fx%3Dy%23z");
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);

        let ctx = self::ctx("/item", &[("id", "a b+c")]);
        assert_eq!(
            Resolvable::url_template("http://backend/{id}").resolve(&ctx),
            "http://backend/a%20b%2Bc"
        );
    }

    #[test]
    fn test_path_segment_refuses_traversal() {
        let template = "fragments/{page}.html";
        let ok = ctx("/x?page=home", &[]);
        assert_eq!(
            interpolate(template, &ok, Encoding::PathSegment).as_deref(),
            Some("fragments/home.html")
        );

        for bad in ["../../etc/passwd", "a/b", "..", "a%5Cb"] {
            let ctx = ctx(&format!("/x?page={bad}"), &[]);
            assert_eq!(interpolate(template, &ctx, Encoding::PathSegment), None, "{bad}");
        }
    }
}
