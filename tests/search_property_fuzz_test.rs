use page_widgets::{Page, SectionId};
use proptest::collection::vec;
use proptest::prelude::*;

fn label_strategy() -> BoxedStrategy<String> {
    prop_oneof![
        "[a-z]{3,10}",
        "[A-Z]{3,10}",
        "[a-zA-Z]{3,6} [a-zA-Z]{3,6}",
        Just("春の遠足".to_string()),
        Just("Ｓｐｒｉｎｇ".to_string()),
    ]
    .prop_map(|label| label.to_string())
    .boxed()
}

fn page_with_sections(labels: &[String]) -> String {
    let mut html = String::from("<div class=\"accordion-container\">\n");
    for (index, label) in labels.iter().enumerate() {
        html.push_str(&format!(
            concat!(
                "<div class=\"accordion-item\" id=\"item-{index}\">",
                "<div class=\"accordion-header\"><span>entry{index}end</span></div>",
                "<div class=\"accordion-content\" data-height=\"100\">{label}</div>",
                "</div>\n"
            ),
            index = index,
            label = label,
        ));
    }
    html.push_str("</div>\n<div class=\"search-container\"><input id=\"searchInput\"></div>");
    html
}

proptest! {
    #[test]
    fn empty_query_always_restores_every_section(
        labels in vec(label_strategy(), 1..6),
        query in label_strategy(),
    ) {
        let mut page = Page::from_html(&page_with_sections(&labels)).unwrap();
        let total = page.section_count();

        page.apply_search(&query).unwrap();
        let restored = page.apply_search("").unwrap();
        prop_assert_eq!(restored.visible_count, total);
        prop_assert_eq!(page.visible_section_count(), total);
    }

    #[test]
    fn case_changes_never_change_the_match_set(
        labels in vec(label_strategy(), 1..6),
        query in "[a-zA-Z]{2,8}",
    ) {
        let mut page = Page::from_html(&page_with_sections(&labels)).unwrap();

        let lower = page.apply_search(&query.to_lowercase()).unwrap();
        let upper = page.apply_search(&query.to_uppercase()).unwrap();
        prop_assert_eq!(lower.matched, upper.matched);
        prop_assert_eq!(lower.visible_count, upper.visible_count);
    }

    #[test]
    fn a_sections_own_marker_always_finds_it(
        labels in vec(label_strategy(), 1..6),
        pick in any::<proptest::sample::Index>(),
    ) {
        let mut page = Page::from_html(&page_with_sections(&labels)).unwrap();
        let index = pick.index(labels.len());

        let outcome = page.apply_search(&format!("entry{index}end")).unwrap();
        prop_assert!(outcome.matched.contains(&SectionId(index)));
        prop_assert!(page.is_section_open(SectionId(index)).unwrap());
    }

    #[test]
    fn matched_sections_are_exactly_the_visible_ones(
        labels in vec(label_strategy(), 1..6),
        query in label_strategy(),
    ) {
        let mut page = Page::from_html(&page_with_sections(&labels)).unwrap();

        let outcome = page.apply_search(&query).unwrap();
        prop_assert_eq!(outcome.visible_count, outcome.matched.len());
        prop_assert_eq!(page.visible_section_count(), outcome.visible_count);
        for index in 0..page.section_count() {
            let open = page.is_section_open(SectionId(index)).unwrap();
            prop_assert_eq!(open, outcome.matched.contains(&SectionId(index)));
        }
    }
}
