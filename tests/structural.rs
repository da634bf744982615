
use decktpl::{Context, DeckTemplate, Scope, TemplateError};
use fixtures::{doc, slide_texts, table_slide, text_slide};

fn items_context() -> Context {
    let mut context = Context::new();
    context.insert_serialized(
        "items",
        &serde_json::json!([
            {"name": "Alice"},
            {"name": "Bob"},
            {"name": "Charlie"},
        ]),
    );
    context
}

#[test]
#[ntest::timeout(1000)]
fn slide_loop_three_items_produce_three_slides() {
    let document = doc(vec![
        text_slide("Title"),
        text_slide("{%slide for item in items %}{{ item.name }}{%slide endfor %}"),
        text_slide("The End"),
    ]);
    let mut template = DeckTemplate::new(document);
    template.render(&items_context()).unwrap();

    assert_eq!(
        slide_texts(template.document()),
        vec!["Title", "Alice", "Bob", "Charlie", "The End"],
    );
}

#[test]
#[ntest::timeout(1000)]
fn slide_loop_over_empty_list_removes_template_slide() {
    let document = doc(vec![
        text_slide("Title"),
        text_slide("{%slide for item in items %}{{ item.name }}{%slide endfor %}"),
        text_slide("The End"),
    ]);
    let mut template = DeckTemplate::new(document);
    let mut context = Context::new();
    context.insert_serialized("items", &serde_json::json!([]));
    template.render(&context).unwrap();

    assert_eq!(slide_texts(template.document()), vec!["Title", "The End"]);
}

#[test]
#[ntest::timeout(1000)]
fn slide_loop_exposes_loop_synthetics() {
    let document = doc(vec![text_slide(
        "{%slide for x in items %}{{ loop.index }}/{{ loop.length }}{%slide endfor %}",
    )]);
    let mut template = DeckTemplate::new(document);
    let mut context = Context::new();
    context.insert("items", vec!["a", "b", "c"]);
    template.render(&context).unwrap();

    assert_eq!(slide_texts(template.document()), vec!["1/3", "2/3", "3/3"]);
}

#[test]
#[ntest::timeout(1000)]
fn slide_loop_first_and_last_flags() {
    let document = doc(vec![text_slide(
        "{%slide for x in items %}\
         {% if loop.first %}FIRST{% endif %}\
         {% if loop.last %}LAST{% endif %}\
         {%slide endfor %}",
    )]);
    let mut template = DeckTemplate::new(document);
    let mut context = Context::new();
    context.insert("items", vec![1, 2, 3]);
    template.render(&context).unwrap();

    let texts = slide_texts(template.document());
    assert_eq!(texts, vec!["FIRST", "", "LAST"]);
}

#[test]
#[ntest::timeout(1000)]
fn slide_conditional_false_removes_slide() {
    let document = doc(vec![
        text_slide("Kept"),
        text_slide("{%slide if show %}Secret{%slide endif %}"),
    ]);
    let mut template = DeckTemplate::new(document);
    let mut context = Context::new();
    context.insert("show", false);
    template.render(&context).unwrap();

    assert_eq!(slide_texts(template.document()), vec!["Kept"]);
}

#[test]
#[ntest::timeout(1000)]
fn slide_conditional_true_strips_markers_only() {
    let document = doc(vec![text_slide("{%slide if show %}Visible {{ title }}{%slide endif %}")]);
    let mut template = DeckTemplate::new(document);
    let mut context = Context::new();
    context.insert("show", true).insert("title", "Report");
    template.render(&context).unwrap();

    let text = template.document().slides[0].text();
    assert_eq!(text, "Visible Report");
    assert!(!text.contains("{%"), "markers must never survive rendering");
}

#[test]
#[ntest::timeout(1000)]
fn independent_loops_on_different_slides_expand_independently() {
    let document = doc(vec![
        text_slide("{%slide for x in xs %}X{{ loop.index }}{%slide endfor %}"),
        text_slide("{%slide for y in ys %}Y{{ loop.index }}{%slide endfor %}"),
    ]);
    let mut template = DeckTemplate::new(document);
    let mut context = Context::new();
    context.insert("xs", vec!["a", "b"]);
    context.insert("ys", vec!["c", "d", "e"]);
    template.render(&context).unwrap();

    assert_eq!(
        slide_texts(template.document()),
        vec!["X1", "X2", "Y1", "Y2", "Y3"],
    );
}

#[test]
#[ntest::timeout(1000)]
fn conditional_inside_slide_loop_checks_each_iteration() {
    let document = doc(vec![text_slide(
        "{%slide for n in nums %}{%slide if n > 1 %}{{ n }}{%slide endfor %}{%slide endif %}",
    )]);
    let mut template = DeckTemplate::new(document);
    let mut context = Context::new();
    context.insert("nums", vec![1, 2, 3]);
    template.render(&context).unwrap();

    assert_eq!(slide_texts(template.document()), vec!["2", "3"]);
}

#[test]
#[ntest::timeout(1000)]
fn unmatched_slide_for_errors_without_mutating() {
    let document = doc(vec![text_slide("{%slide for item in items %}no close")]);
    let original = document.clone();
    let mut template = DeckTemplate::new(document);

    let err = template.render(&items_context()).unwrap_err();
    match err {
        TemplateError::UnmatchedDirective { scope, marker, .. } => {
            assert_eq!(scope, Scope::Slide);
            assert_eq!(marker, "for item in items");
        }
        other => panic!("expected UnmatchedDirective, got {other:?}"),
    }
    assert_eq!(template.document(), &original, "document must be untouched");
}

#[test]
#[ntest::timeout(1000)]
fn row_loop_clones_rows_with_bound_context() {
    let document = doc(vec![table_slide(&[
        &["Name", "Qty"],
        &[
            "{%tr for it in items %}{{ it.name }}",
            "{{ loop.index }}{%tr endfor %}",
        ],
    ])]);
    let mut template = DeckTemplate::new(document);
    template.render(&items_context()).unwrap();

    let decktpl::Shape::Table(table) = &template.document().slides[0].shapes[0] else {
        panic!("expected a table shape");
    };
    assert_eq!(table.rows.len(), 4, "header plus three clones");
    assert_eq!(fixtures::row_texts(&table.rows[1]), vec!["Alice", "1"]);
    assert_eq!(fixtures::row_texts(&table.rows[2]), vec!["Bob", "2"]);
    assert_eq!(fixtures::row_texts(&table.rows[3]), vec!["Charlie", "3"]);
    // Mutation never touches the column grid.
    assert_eq!(table.column_widths.len(), 2);
}

#[test]
#[ntest::timeout(1000)]
fn row_conditional_false_removes_row() {
    let document = doc(vec![table_slide(&[
        &["Header"],
        &["{%tr if ok %}Gone{%tr endif %}"],
    ])]);
    let mut template = DeckTemplate::new(document);
    let mut context = Context::new();
    context.insert("ok", false);
    template.render(&context).unwrap();

    let decktpl::Shape::Table(table) = &template.document().slides[0].shapes[0] else {
        panic!("expected a table shape");
    };
    assert_eq!(table.rows.len(), 1);
    assert_eq!(fixtures::row_texts(&table.rows[0]), vec!["Header"]);
}

#[test]
#[ntest::timeout(1000)]
fn row_markers_in_different_rows_are_unmatched() {
    let document = doc(vec![table_slide(&[
        &["{%tr for it in items %}open here"],
        &["close there{%tr endfor %}"],
    ])]);
    let mut template = DeckTemplate::new(document);
    let err = template.render(&items_context()).unwrap_err();
    assert!(matches!(
        err,
        TemplateError::UnmatchedDirective { scope: Scope::Row, .. }
    ));
}

#[test]
#[ntest::timeout(1000)]
fn cell_conditional_false_collapses_cell_range() {
    let document = doc(vec![table_slide(&[&[
        "A",
        "{%tc if flag %}B",
        "C",
        "D{%tc endif %}",
        "E",
    ]])]);
    let mut template = DeckTemplate::new(document);
    let mut context = Context::new();
    context.insert("flag", false);
    template.render(&context).unwrap();

    let decktpl::Shape::Table(table) = &template.document().slides[0].shapes[0] else {
        panic!("expected a table shape");
    };
    // Interior cell removed, boundary cells merged into one.
    assert_eq!(
        fixtures::row_texts(&table.rows[0]),
        vec!["A", "B\nD", "E"],
    );
}

#[test]
#[ntest::timeout(1000)]
fn cell_conditional_true_strips_marker_text_only() {
    let document = doc(vec![table_slide(&[&[
        "A",
        "{%tc if flag %}B",
        "C",
        "D{%tc endif %}",
        "E",
    ]])]);
    let mut template = DeckTemplate::new(document);
    let mut context = Context::new();
    context.insert("flag", true);
    template.render(&context).unwrap();

    let decktpl::Shape::Table(table) = &template.document().slides[0].shapes[0] else {
        panic!("expected a table shape");
    };
    assert_eq!(
        fixtures::row_texts(&table.rows[0]),
        vec!["A", "B", "C", "D", "E"],
    );
}

#[test]
#[ntest::timeout(1000)]
fn cell_conditional_within_one_cell_gates_text_only() {
    let document = doc(vec![table_slide(&[&[
        "X{%tc if f %}secret{%tc endif %}Y",
        "other",
    ]])]);
    let mut template = DeckTemplate::new(document);
    let mut context = Context::new();
    context.insert("f", false);
    template.render(&context).unwrap();

    let decktpl::Shape::Table(table) = &template.document().slides[0].shapes[0] else {
        panic!("expected a table shape");
    };
    assert_eq!(fixtures::row_texts(&table.rows[0]), vec!["XY", "other"]);
}

#[test]
#[ntest::timeout(1000)]
fn independent_loops_on_one_slide_concatenate_clones() {
    // Both pairs expand against the same original slide; the clone lists
    // land in marker order at the template's position.
    let document = doc(vec![text_slide(
        "{%slide for x in xs %}{{ x }}{%slide endfor %}\
         {%slide for y in ys %}{{ y }}{%slide endfor %}",
    )]);
    let mut template = DeckTemplate::new(document);
    let mut context = Context::new();
    context.insert("xs", vec!["a", "b"]);
    context.insert("ys", vec!["c"]);
    template.render(&context).unwrap();

    assert_eq!(slide_texts(template.document()), vec!["a", "b", "c"]);
}

#[test]
#[ntest::timeout(1000)]
fn nested_cell_conditionals_error_instead_of_collapsing() {
    // Same-kind spans must not overlap; the inner pair cannot be resolved
    // without invalidating the outer pair's cell indices.
    let document = doc(vec![table_slide(&[&[
        "{%tc if a %}A",
        "{%tc if b %}B",
        "C",
        "D{%tc endif %}",
        "E{%tc endif %}",
    ]])]);
    let mut template = DeckTemplate::new(document);
    let mut context = Context::new();
    context.insert("a", true).insert("b", false);

    let err = template.render(&context).unwrap_err();
    assert!(matches!(
        err,
        TemplateError::UnmatchedDirective { scope: Scope::Cell, .. }
    ));
}

#[test]
#[ntest::timeout(1000)]
fn shape_conditional_false_removes_shape_range() {
    let mut slide = text_slide("Title");
    slide.shapes.push(decktpl::Shape::TextBox(
        decktpl::TextFrame::from_text("{%sp if detail %}Breakdown"),
    ));
    slide
        .shapes
        .push(decktpl::Shape::Table(fixtures::table(&[&["x", "y"]])));
    slide.shapes.push(decktpl::Shape::TextBox(
        decktpl::TextFrame::from_text("Footnote{%sp endif %}"),
    ));
    let mut template = DeckTemplate::new(doc(vec![slide]));
    let mut context = Context::new();
    context.insert("detail", false);
    template.render(&context).unwrap();

    let shapes = &template.document().slides[0].shapes;
    assert_eq!(shapes.len(), 1, "marker shapes and interior shapes removed");
    assert_eq!(template.document().slides[0].text(), "Title");
}

#[test]
#[ntest::timeout(1000)]
fn shape_conditional_true_strips_markers_only() {
    let mut slide = text_slide("Title");
    slide.shapes.push(decktpl::Shape::TextBox(
        decktpl::TextFrame::from_text("{%sp if detail %}Breakdown{%sp endif %}"),
    ));
    let mut template = DeckTemplate::new(doc(vec![slide]));
    let mut context = Context::new();
    context.insert("detail", true);
    template.render(&context).unwrap();

    let slide = &template.document().slides[0];
    assert_eq!(slide.shapes.len(), 2);
    assert_eq!(slide.text(), "Title Breakdown");
}

#[test]
#[ntest::timeout(1000)]
fn paragraph_conditional_false_removes_spanned_paragraphs() {
    let document = doc(vec![text_slide(
        "Intro\n{%pp if detail %}Fine a\nFine b{%pp endif %}\nOutro",
    )]);
    let mut template = DeckTemplate::new(document);
    let mut context = Context::new();
    context.insert("detail", false);
    template.render(&context).unwrap();

    assert_eq!(template.document().slides[0].text(), "Intro\nOutro");
}

#[test]
#[ntest::timeout(1000)]
fn paragraph_conditional_true_strips_markers_only() {
    let document = doc(vec![text_slide(
        "Intro\n{%pp if detail %}Fine print{%pp endif %}\nOutro",
    )]);
    let mut template = DeckTemplate::new(document);
    let mut context = Context::new();
    context.insert("detail", true);
    template.render(&context).unwrap();

    assert_eq!(
        template.document().slides[0].text(),
        "Intro\nFine print\nOutro",
    );
}

#[test]
#[ntest::timeout(1000)]
fn paragraph_markers_in_different_frames_are_unmatched() {
    let mut slide = text_slide("{%pp if x %}open here");
    slide.shapes.push(decktpl::Shape::TextBox(
        decktpl::TextFrame::from_text("close there{%pp endif %}"),
    ));
    let mut template = DeckTemplate::new(doc(vec![slide]));
    let err = template.render(&Context::new()).unwrap_err();
    assert!(matches!(
        err,
        TemplateError::UnmatchedDirective { scope: Scope::Paragraph, .. }
    ));
}

#[test]
#[ntest::timeout(1000)]
fn row_loop_inside_slide_loop_sees_both_bindings() {
    let mut slide = text_slide("{%slide for g in groups %}{{ g.name }}{%slide endfor %}");
    slide
        .shapes
        .push(decktpl::Shape::Table(fixtures::table(&[&[
            "{%tr for m in g.members %}{{ m }} ({{ g.name }}){%tr endfor %}",
        ]])));
    let document = doc(vec![slide]);

    let mut template = DeckTemplate::new(document);
    let mut context = Context::new();
    context.insert_serialized(
        "groups",
        &serde_json::json!([
            {"name": "A", "members": ["x", "y"]},
            {"name": "B", "members": ["z"]},
        ]),
    );
    template.render(&context).unwrap();

    let slides = &template.document().slides;
    assert_eq!(slides.len(), 2);

    let decktpl::Shape::Table(table) = &slides[0].shapes[1] else {
        panic!("expected a table shape");
    };
    assert_eq!(fixtures::row_texts(&table.rows[0]), vec!["x (A)"]);
    assert_eq!(fixtures::row_texts(&table.rows[1]), vec!["y (A)"]);

    let decktpl::Shape::Table(table) = &slides[1].shapes[1] else {
        panic!("expected a table shape");
    };
    assert_eq!(table.rows.len(), 1);
    assert_eq!(fixtures::row_texts(&table.rows[0]), vec!["z (B)"]);
}

#[test]
#[ntest::timeout(1000)]
fn inline_jinja_loop_inside_slide_loop() {
    let document = doc(vec![text_slide(
        "{%slide for section in sections %}\
         {{ section.title }}: \
         {% for point in section.points %}{{ point }} {% endfor %}\
         {%slide endfor %}",
    )]);
    let mut template = DeckTemplate::new(document);
    let mut context = Context::new();
    context.insert_serialized(
        "sections",
        &serde_json::json!([
            {"title": "Intro", "points": ["A", "B"]},
            {"title": "Body", "points": ["C", "D", "E"]},
        ]),
    );
    template.render(&context).unwrap();

    let texts = slide_texts(template.document());
    assert_eq!(texts, vec!["Intro: A B ", "Body: C D E "]);
}
