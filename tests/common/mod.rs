//! Export fixtures shared by the integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::Path;

/// A minimal exported page with the given breadcrumb targets.
pub fn export_page(crumbs: &[&str], title: &str, body: &str) -> String {
    let items: String = crumbs
        .iter()
        .map(|href| {
            let label = href.trim_end_matches(".html");
            format!(r#"<li><a href="{href}">{label}</a></li>"#)
        })
        .collect();
    format!(
        r#"<!DOCTYPE html><html><head><title>{title}</title></head><body>
<div id="main-header"><div id="breadcrumb-section"><ol id="breadcrumbs">{items}</ol></div>
<h1 id="title-heading" class="pagetitle"><span id="title-text">IT : {title}</span></h1></div>
<div id="content" class="view"><div id="main-content" class="wiki-content group">{body}</div></div>
</body></html>"#
    )
}

pub fn write(dir: &Path, rel: &str, content: impl AsRef<[u8]>) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

pub fn page_object(id: &str, title: &str, parent: Option<&str>) -> String {
    let parent = parent
        .map(|p| {
            format!(
                r#"<property name="parent" class="Page" package="com.atlassian.confluence.pages"><id name="id">{p}</id></property>"#
            )
        })
        .unwrap_or_default();
    format!(
        r#"<object class="Page" package="com.atlassian.confluence.pages">
<id name="id">{id}</id>
<property name="title"><![CDATA[{title}]]></property>
{parent}
<property name="contentStatus"><![CDATA[current]]></property>
<collection name="bodyContents" class="java.util.Collection"><element class="BodyContent" package="com.atlassian.confluence.core"><id name="id">{id}0</id></element></collection>
</object>"#
    )
}

pub fn body_object(page_id: &str, body: &str) -> String {
    format!(
        r#"<object class="BodyContent" package="com.atlassian.confluence.core">
<id name="id">{page_id}0</id>
<property name="body"><![CDATA[{body}]]></property>
<property name="content" class="Page" package="com.atlassian.confluence.pages"><id name="id">{page_id}</id></property>
</object>"#
    )
}

pub fn attachment_object(id: &str, title: &str, container: &str) -> String {
    format!(
        r#"<object class="Attachment" package="com.atlassian.confluence.pages">
<id name="id">{id}</id>
<property name="title"><![CDATA[{title}]]></property>
<property name="version">1</property>
<property name="containerContent" class="Page" package="com.atlassian.confluence.pages"><id name="id">{container}</id></property>
</object>"#
    )
}
