use page_widgets::{Page, PendingTaskKind, SectionId, Toggle};

const SEASONS: &str = r#"
<div class="accordion-container">
  <div class="accordion-item" id="item-a">
    <div class="accordion-header" id="head-a" data-height="50"><span>2021 Spring</span><span class="sub-text">Festival</span></div>
    <div class="accordion-content" id="body-a" data-height="120">Cherry blossom program</div>
  </div>
  <div class="accordion-item" id="item-b">
    <div class="accordion-header" id="head-b" data-height="50"><span>2022 Fall</span><span class="sub-text">Sports day</span></div>
    <div class="accordion-content" id="body-b" data-height="140">Relay results</div>
  </div>
</div>
"#;

const SONGS: &str = r#"
<div class="song-section" id="song-1">
  <h3 id="song-head">校歌</h3>
  <div class="lyrics-content" id="song-body" data-height="200">一番の歌詞</div>
</div>
"#;

#[test]
fn click_flips_a_section_open_and_closed() -> page_widgets::Result<()> {
    let mut page = Page::from_html(SEASONS)?;

    page.click("#head-a")?;
    assert!(page.is_section_open(SectionId(0))?);
    assert_eq!(page.style_value("#body-a", "max-height")?.as_deref(), Some("120px"));
    assert_eq!(page.attr_value("#head-a", "class")?.as_deref(), Some("accordion-header active"));
    assert_eq!(page.attr_value("#item-a", "class")?.as_deref(), Some("accordion-item active"));

    page.click("#head-a")?;
    assert!(!page.is_section_open(SectionId(0))?);
    assert_eq!(page.style_value("#body-a", "max-height")?, None);
    assert_eq!(page.attr_value("#head-a", "class")?.as_deref(), Some("accordion-header"));
    Ok(())
}

#[test]
fn clicks_inside_the_header_still_toggle_it() -> page_widgets::Result<()> {
    let mut page = Page::from_html(SEASONS)?;
    page.click("#head-b .sub-text")?;
    assert!(page.is_section_open(SectionId(1))?);
    assert!(!page.is_section_open(SectionId(0))?);
    Ok(())
}

#[test]
fn open_and_close_are_idempotent() -> page_widgets::Result<()> {
    let mut page = Page::from_html(SEASONS)?;

    page.toggle_section(SectionId(0), Toggle::Open)?;
    let measured = page.section_measured_height(SectionId(0))?;
    let height = page.style_value("#body-a", "max-height")?;

    page.toggle_section(SectionId(0), Toggle::Open)?;
    assert!(page.is_section_open(SectionId(0))?);
    assert_eq!(page.section_measured_height(SectionId(0))?, measured);
    assert_eq!(page.style_value("#body-a", "max-height")?, height);

    page.toggle_section(SectionId(0), Toggle::Closed)?;
    let measured = page.section_measured_height(SectionId(0))?;
    page.toggle_section(SectionId(0), Toggle::Closed)?;
    assert!(!page.is_section_open(SectionId(0))?);
    assert_eq!(page.section_measured_height(SectionId(0))?, measured);
    assert_eq!(page.style_value("#body-a", "max-height")?, None);
    Ok(())
}

#[test]
fn open_sections_carry_their_measured_height() -> page_widgets::Result<()> {
    let mut page = Page::from_html(SEASONS)?;

    for index in 0..page.section_count() {
        page.toggle_section(SectionId(index), Toggle::Open)?;
    }
    assert_eq!(page.section_measured_height(SectionId(0))?, 120);
    assert_eq!(page.section_measured_height(SectionId(1))?, 140);
    assert_eq!(page.style_value("#body-a", "max-height")?.as_deref(), Some("120px"));
    assert_eq!(page.style_value("#body-b", "max-height")?.as_deref(), Some("140px"));
    Ok(())
}

#[test]
fn lyrics_sections_animate_padding_and_opacity() -> page_widgets::Result<()> {
    let mut page = Page::from_html(SONGS)?;
    assert_eq!(page.section_count(), 1);

    page.click("#song-head")?;
    assert!(page.is_section_open(SectionId(0))?);
    assert_eq!(page.style_value("#song-body", "max-height")?.as_deref(), Some("200px"));
    assert_eq!(page.style_value("#song-body", "padding")?.as_deref(), Some("20px"));
    assert_eq!(page.style_value("#song-body", "opacity")?.as_deref(), Some("1"));

    page.click("#song-head")?;
    assert!(!page.is_section_open(SectionId(0))?);
    assert_eq!(page.style_value("#song-body", "max-height")?.as_deref(), Some("0px"));
    assert_eq!(page.style_value("#song-body", "padding")?.as_deref(), Some("0 20px"));
    assert_eq!(page.style_value("#song-body", "opacity")?.as_deref(), Some("0"));
    Ok(())
}

#[test]
fn song_headers_toggle_exactly_once_per_click() -> page_widgets::Result<()> {
    // Double binding would make every click cancel itself out.
    let html = r#"
    <div class="song-section accordion-item" id="song-1">
      <div class="accordion-header" id="song-head">応援歌</div>
      <div class="lyrics-content" id="song-body" data-height="80">歌詞</div>
    </div>
    "#;
    let mut page = Page::from_html(html)?;
    assert_eq!(page.section_count(), 1);

    page.click("#song-head")?;
    assert!(page.is_section_open(SectionId(0))?);
    page.click("#song-head")?;
    assert!(!page.is_section_open(SectionId(0))?);
    Ok(())
}

#[test]
fn retoggling_mid_transition_replaces_the_completion_signal() -> page_widgets::Result<()> {
    let mut page = Page::from_html(SEASONS)?;

    page.toggle_section(SectionId(0), Toggle::Open)?;
    let pending = page.pending_tasks();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, PendingTaskKind::Transition);
    assert_eq!(pending[0].due_at, 300);

    page.advance_time(100)?;
    page.toggle_section(SectionId(0), Toggle::Closed)?;
    let pending = page.pending_tasks();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].due_at, 400);

    page.advance_time(300)?;
    assert!(page.pending_tasks().is_empty());
    Ok(())
}
