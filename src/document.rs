use crate::config::Config;
use anyhow::{anyhow, Context, Result};
use lopdf::{dictionary, Document, Object, Stream};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub path: String,
    pub file_bytes: u64,
    pub page_count: u32,
}

pub fn probe_pdf(cfg: &Config, input: &Path) -> Result<ProbeResult> {
    let meta = std::fs::metadata(input).with_context(|| "stat input")?;
    let file_bytes = meta.len();
    if file_bytes > cfg.limits.max_input_file_bytes {
        anyhow::bail!("input exceeds max_input_file_bytes: {}", file_bytes);
    }

    let page_count = page_count(input)?;
    if page_count > cfg.limits.max_input_pages {
        anyhow::bail!("input exceeds max_input_pages: {}", page_count);
    }

    Ok(ProbeResult {
        path: input.display().to_string(),
        file_bytes,
        page_count,
    })
}

pub fn page_count(input: &Path) -> Result<u32> {
    let doc = Document::load(input).with_context(|| format!("open pdf: {}", input.display()))?;
    Ok(doc.get_pages().len() as u32)
}

pub fn extract_range(input: &Path, start_page: u32, end_page: u32) -> Result<Vec<u8>> {
    if end_page <= start_page {
        return Err(anyhow!("empty page range {start_page}..{end_page}"));
    }

    let mut doc =
        Document::load(input).with_context(|| format!("open pdf: {}", input.display()))?;
    let total = doc.get_pages().len() as u32;
    if end_page > total {
        return Err(anyhow!(
            "page range {start_page}..{end_page} exceeds page count {total}"
        ));
    }

    // lopdf numbers pages from 1.
    let outside: Vec<u32> = (1..=total)
        .filter(|p| *p <= start_page || *p > end_page)
        .collect();
    if !outside.is_empty() {
        doc.delete_pages(&outside);
        doc.prune_objects();
    }

    let mut buf = Vec::new();
    doc.save_to(&mut buf)
        .with_context(|| format!("serialize pages {start_page}..{end_page}"))?;
    Ok(buf)
}

pub fn synthetic_pdf(pages: &[&str]) -> Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for text in pages {
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => resources_id,
        };
        if !text.is_empty() {
            let escaped = text
                .replace('\\', "\\\\")
                .replace('(', "\\(")
                .replace(')', "\\)");
            let content = format!("BT /F1 12 Tf 72 720 Td ({escaped}) Tj ET");
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
            page.set("Contents", content_id);
        }
        kids.push(doc.add_object(page).into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).with_context(|| "serialize synthetic pdf")?;
    Ok(buf)
}
