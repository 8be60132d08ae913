use super::*;

#[test]
fn parse_builds_nested_elements_and_indexes_ids() -> Result<()> {
    let dom = html::parse_html(
        r#"
        <div id="outer" class="wrap">
            <p class="note">hello <b>world</b></p>
        </div>
        "#,
    )?;

    let outer = dom.by_id("outer").expect("outer indexed");
    assert_eq!(dom.tag_name(outer), Some("div"));
    assert!(dom.class_contains(outer, "wrap"));

    let note = dom.query_selector("#outer .note")?.expect("note found");
    assert_eq!(dom.text_content(note), "hello world");
    Ok(())
}

#[test]
fn parse_decodes_character_references() -> Result<()> {
    let dom = html::parse_html(r#"<p id="msg">a &amp; b &lt;c&gt; &#x41;&yen;</p>"#)?;
    let msg = dom.by_id("msg").expect("msg indexed");
    assert_eq!(dom.text_content(msg), "a & b <c> A¥");
    Ok(())
}

#[test]
fn parse_keeps_raw_text_bodies_inert() -> Result<()> {
    let dom = html::parse_html(
        r#"
        <div id="result">ok</div>
        <script>if (1 < 2) { document.title = "</div>"; }</script>
        "#,
    )?;
    let result = dom.by_id("result").expect("result indexed");
    assert_eq!(dom.text_content(result), "ok");

    let script = dom.first_by_tag("script").expect("script kept");
    assert!(dom.text_content(script).contains("document.title"));
    Ok(())
}

#[test]
fn parse_handles_void_and_self_closing_tags() -> Result<()> {
    let dom = html::parse_html(r#"<div id="wrap"><img src="a.jpg"><br/><span>tail</span></div>"#)?;
    let wrap = dom.by_id("wrap").expect("wrap indexed");
    let tags = dom
        .children(wrap)
        .filter_map(|child| dom.tag_name(child).map(str::to_string))
        .collect::<Vec<_>>();
    assert_eq!(tags, vec!["img", "br", "span"]);
    Ok(())
}

#[test]
fn parse_reports_unclosed_structures() {
    let err = html::parse_html("<!-- never closed").unwrap_err();
    assert!(matches!(err, Error::HtmlParse(_)));

    let err = html::parse_html("<div").unwrap_err();
    assert!(matches!(err, Error::HtmlParse(_)));
}

#[test]
fn selector_class_and_descendant_matching() -> Result<()> {
    let dom = html::parse_html(
        r#"
        <div class="image-grid"><img id="one"><img id="two"></div>
        <div class="image-gallery"><img id="three"></div>
        <img id="loose">
        "#,
    )?;

    let imgs = dom.query_selector_all(".image-grid img, .image-gallery img")?;
    let ids = imgs
        .iter()
        .filter_map(|node| dom.attr(*node, "id"))
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["one", "two", "three"]);
    Ok(())
}

#[test]
fn selector_compound_steps_require_every_part() -> Result<()> {
    let dom = html::parse_html(
        r#"<div class="accordion-item active">x</div><div class="accordion-item">y</div>"#,
    )?;
    let matched = dom.query_selector_all("div.accordion-item.active")?;
    assert_eq!(matched.len(), 1);
    Ok(())
}

#[test]
fn unsupported_selector_is_an_error() {
    let dom = html::parse_html("<p>x</p>").unwrap();
    let err = dom.query_selector("p:first-child").unwrap_err();
    assert!(matches!(err, Error::UnsupportedSelector(_)));

    let err = dom.query_selector("div > p").unwrap_err();
    assert!(matches!(err, Error::UnsupportedSelector(_)));
}

#[test]
fn style_set_updates_and_clears_inline_declarations() -> Result<()> {
    let mut dom = html::parse_html(r#"<div id="box" style="color: red">x</div>"#)?;
    let node = dom.by_id("box").expect("box indexed");

    dom.style_set(node, "max-height", "120px")?;
    assert_eq!(dom.style_get(node, "max-height").as_deref(), Some("120px"));
    assert_eq!(dom.style_get(node, "color").as_deref(), Some("red"));

    dom.style_set(node, "max-height", "")?;
    assert_eq!(dom.style_get(node, "max-height"), None);

    dom.style_set(node, "color", "")?;
    assert_eq!(dom.attr(node, "style"), None);
    Ok(())
}

#[test]
fn layout_measures_natural_and_rendered_heights() -> Result<()> {
    let dom = html::parse_html(
        r#"
        <div class="accordion-item" id="item">
            <div class="accordion-header" data-height="50">head</div>
            <div class="accordion-content" data-height="120">body</div>
        </div>
        "#,
    )?;
    let item = dom.by_id("item").expect("item indexed");
    let content = dom.query_selector(".accordion-content")?.expect("content");

    // The body renders collapsed until an inline max-height opens it.
    assert_eq!(layout::natural_height(&dom, content), 120);
    assert_eq!(layout::rendered_height(&dom, content), 0);
    assert_eq!(layout::rendered_height(&dom, item), 50);
    Ok(())
}

#[test]
fn layout_document_top_stacks_preceding_siblings() -> Result<()> {
    let mut dom = html::parse_html(
        r#"
        <nav data-height="60">menu</nav>
        <div id="first" data-height="100">a</div>
        <div id="second" data-height="40">b</div>
        "#,
    )?;
    let second = dom.by_id("second").expect("second indexed");
    assert_eq!(layout::document_top(&dom, second), 160);
    assert_eq!(layout::nav_height(&dom), 60);

    let first = dom.by_id("first").expect("first indexed");
    dom.style_set(first, "display", "none")?;
    assert_eq!(layout::document_top(&dom, second), 60);
    Ok(())
}

#[test]
fn page_without_widget_elements_stays_inactive() -> Result<()> {
    let mut page = Page::from_html("<p id='solo'>plain page</p>")?;
    assert_eq!(page.section_count(), 0);
    assert_eq!(page.visible_section_count(), 0);
    assert!(page.pending_tasks().is_empty());

    page.click("#solo")?;

    let err = page.apply_search("x").unwrap_err();
    assert!(matches!(err, Error::Runtime(_)));
    Ok(())
}

#[test]
fn accordion_item_without_content_is_a_structural_mismatch() {
    let err = Page::from_html(
        r#"<div class="accordion-item"><div class="accordion-header">h</div></div>"#,
    )
    .unwrap_err();
    assert!(matches!(err, Error::StructuralMismatch(_)));
}

#[test]
fn out_of_range_section_id_is_an_invalid_reference() -> Result<()> {
    let mut page = Page::from_html(
        r#"
        <div class="accordion-item">
            <div class="accordion-header">h</div>
            <div class="accordion-content">c</div>
        </div>
        "#,
    )?;
    let err = page.toggle_section(SectionId(5), Toggle::Open).unwrap_err();
    assert!(matches!(err, Error::InvalidReference(_)));

    let err = page.is_section_open(SectionId(1)).unwrap_err();
    assert!(matches!(err, Error::InvalidReference(_)));
    Ok(())
}

#[test]
fn pre_active_header_starts_open_with_height_synced() -> Result<()> {
    let page = Page::from_html(
        r#"
        <div class="accordion-item">
            <div class="accordion-header active">h</div>
            <div class="accordion-content" data-height="90">c</div>
        </div>
        "#,
    )?;
    assert!(page.is_section_open(SectionId(0))?);
    assert_eq!(page.section_measured_height(SectionId(0))?, 90);
    assert_eq!(
        page.style_value(".accordion-content", "max-height")?.as_deref(),
        Some("90px")
    );
    Ok(())
}

#[test]
fn typing_replaces_the_pending_debounce_task() -> Result<()> {
    let mut page = Page::from_html(
        r#"
        <div class="accordion-item">
            <div class="accordion-header">h</div>
            <div class="accordion-content">c</div>
        </div>
        <input id="searchInput">
        "#,
    )?;

    page.type_text("#searchInput", "a")?;
    let first = page.pending_tasks();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].kind, PendingTaskKind::Search);
    assert_eq!(first[0].due_at, 150);

    page.advance_time(50)?;
    page.type_text("#searchInput", "ab")?;
    let second = page.pending_tasks();
    assert_eq!(second.len(), 1);
    assert_ne!(second[0].id, first[0].id);
    assert_eq!(second[0].due_at, 200);
    Ok(())
}

#[test]
fn type_text_rejects_non_input_targets() {
    let mut page = Page::from_html("<p id='p'>x</p>").unwrap();
    let err = page.type_text("#p", "query").unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { .. }));
}

#[test]
fn clock_validates_backward_movement() {
    let mut page = Page::from_html("<p>x</p>").unwrap();
    page.advance_time(100).unwrap();
    let err = page.advance_time_to(50).unwrap_err();
    assert!(matches!(err, Error::Runtime(_)));

    let err = page.advance_time(-1).unwrap_err();
    assert!(matches!(err, Error::Runtime(_)));
}

#[test]
fn trace_logs_are_bounded_and_drainable() -> Result<()> {
    let mut page = Page::from_html("<p id='p'>x</p>")?;
    page.enable_trace(true);
    page.set_trace_stderr(false);
    page.set_trace_log_limit(2)?;

    page.click("#p")?;
    page.advance_time(10)?;
    page.advance_time(10)?;

    let logs = page.take_trace_logs();
    assert_eq!(logs.len(), 2);
    assert!(page.take_trace_logs().is_empty());
    Ok(())
}
