//! Server-rendered pages
//!
//! Templates are compiled into the binary and rendered with tera.
//! Autoescaping is on, so titles and urls are safe to interpolate.

use tera::{Context, Tera};

use crate::client::EMPTY_MESSAGE;
use crate::storage::{Bookmark, User};

const LANDING: &str = "landing.html";
const DASHBOARD: &str = "dashboard.html";

pub struct Pages {
    tera: Tera,
    provider_label: String,
}

impl Pages {
    pub fn new(provider_label: impl Into<String>) -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            (LANDING, include_str!("../../templates/landing.html")),
            (DASHBOARD, include_str!("../../templates/dashboard.html")),
        ])?;

        Ok(Self {
            tera,
            provider_label: provider_label.into(),
        })
    }

    /// Sign-in page for anonymous visitors
    pub fn landing(&self) -> Result<String, tera::Error> {
        let mut context = Context::new();
        context.insert("provider_label", &self.provider_label);
        self.tera.render(LANDING, &context)
    }

    /// Dashboard seeded with `bookmarks` (already newest first)
    pub fn dashboard(&self, user: &User, bookmarks: &[Bookmark]) -> Result<String, tera::Error> {
        let mut context = Context::new();
        context.insert("user_id", &user.id);
        context.insert("signed_in_as", user.display_name());
        context.insert("bookmarks", bookmarks);
        context.insert("empty_message", EMPTY_MESSAGE);
        self.tera.render(DASHBOARD, &context)
    }
}
