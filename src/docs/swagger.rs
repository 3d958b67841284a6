//! Swagger UI page.
//!
//! The page loads Swagger UI from a CDN and fetches the document from the
//! JSON endpoint, so the HTML does not change when routes do.

/// Swagger UI release loaded from the CDN.
pub const SWAGGER_UI_VERSION: &str = "5.18.2";

/// Content security policy for the docs page: CDN assets plus the inline
/// bootstrap script.
pub const DOCS_CONTENT_SECURITY_POLICY: &str = "default-src 'self';\
     script-src 'self' 'unsafe-inline' https://unpkg.com;\
     style-src 'self' 'unsafe-inline' https://unpkg.com;\
     img-src 'self' data: https:;\
     object-src 'none';frame-ancestors 'self'";

/// Document expansion level for Swagger UI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DocExpansion {
    /// Show all operations collapsed.
    #[default]
    None,
    /// Show only the list of operations.
    List,
    /// Expand all operations fully.
    Full,
}

impl DocExpansion {
    fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::List => "list",
            Self::Full => "full",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SwaggerUi {
    title: String,
    spec_url: String,
    doc_expansion: DocExpansion,
    display_operation_id: bool,
}

impl SwaggerUi {
    /// A page for the document served at `spec_url`.
    #[must_use]
    pub fn new(title: &str, spec_url: impl Into<String>) -> Self {
        Self {
            title: format!("{title} - Swagger UI"),
            spec_url: spec_url.into(),
            doc_expansion: DocExpansion::None,
            display_operation_id: true,
        }
    }

    #[must_use]
    pub fn doc_expansion(mut self, expansion: DocExpansion) -> Self {
        self.doc_expansion = expansion;
        self
    }

    #[must_use]
    pub fn display_operation_id(mut self, enabled: bool) -> Self {
        self.display_operation_id = enabled;
        self
    }

    /// Render the HTML page.
    #[must_use]
    pub fn html(&self) -> String {
        format!(
            r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@{version}/swagger-ui.css" />
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@{version}/swagger-ui-bundle.js"></script>
    <script src="https://unpkg.com/swagger-ui-dist@{version}/swagger-ui-standalone-preset.js"></script>
    <script>
        window.onload = function() {{
            window.ui = SwaggerUIBundle({{
                url: '{spec_url}',
                dom_id: '#swagger-ui',
                docExpansion: '{doc_expansion}',
                displayOperationId: {display_operation_id},
                presets: [
                    SwaggerUIBundle.presets.apis,
                    SwaggerUIStandalonePreset
                ],
                layout: "StandaloneLayout"
            }});
        }};
    </script>
</body>
</html>"##,
            title = html_escape(&self.title),
            version = SWAGGER_UI_VERSION,
            spec_url = html_escape(&self.spec_url),
            doc_expansion = self.doc_expansion.as_str(),
            display_operation_id = self.display_operation_id,
        )
    }
}

/// Simple HTML escape for XSS prevention in interpolated values.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
