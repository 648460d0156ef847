use crate::model::{week_label, Board, Item, MONTHS, WEEKS};
use chrono::{Month, NaiveDate};
use maud::{html, Markup, PreEscaped, DOCTYPE};

pub fn render_board(board: &Board, title: &str, today: NaiveDate) -> Markup {
    let prev_year = board.year.checked_sub(1);
    let next_year = board.year.checked_add(1);
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (title) " " (board.year) }
                style { (PreEscaped(CSS)) }
            }
            body {
                header {
                    h1 { (title) " " (board.year) }
                    nav.years {
                        @if let Some(prev) = prev_year {
                            a href={ "/?year=" (prev) } { "\u{2190} " (prev) }
                        }
                        @if let Some(next) = next_year {
                            a href={ "/?year=" (next) } { (next) " \u{2192}" }
                        }
                    }
                    (add_item_form(today))
                }
                main.board {
                    @for month in 1..=MONTHS {
                        (render_month(board, month))
                    }
                }
                (render_footer(board))
                script { (PreEscaped(JAVASCRIPT)) }
            }
        }
    }
}

fn render_month(board: &Board, month: u32) -> Markup {
    let count: usize = (1..=WEEKS).map(|w| board.items_in(month, w).len()).sum();
    html! {
        section.month data-month=(month) {
            h2 {
                (month_name(month))
                span.count { (count) }
            }
            div.weeks {
                @for week in 1..=WEEKS {
                    div.week data-week=(week) {
                        h3 { (week_label(week)) }
                        @for item in board.items_in(month, week) {
                            (render_card(item))
                        }
                    }
                }
            }
        }
    }
}

fn render_card(item: &Item) -> Markup {
    let status_class = item
        .status()
        .map(|s| format!("card status-{}", css_token(s)))
        .unwrap_or_else(|| "card".to_string());
    let current = item.date().map(|d| d.to_string()).unwrap_or_default();
    html! {
        article class=(status_class) title=(item.file) {
            div.card-title { (item.title) }
            div.card-meta {
                span.deadline { (item.deadline) }
                @if let Some(program) = item.program() {
                    span.program { (program) }
                }
                @if let Some(status) = item.status() {
                    span.status { (status) }
                }
            }
            form.reschedule data-action="reschedule" {
                input type="hidden" name="file" value=(item.file);
                input type="date" name="deadline" value=(current) required;
                button type="submit" { "Move" }
            }
        }
    }
}

fn add_item_form(today: NaiveDate) -> Markup {
    html! {
        form.add-item data-action="additem" {
            input type="text" name="program" placeholder="Program" required;
            input type="text" name="name" placeholder="Name" required;
            input type="date" name="deadline" value=(today.to_string()) required;
            button type="submit" { "Add" }
        }
    }
}

fn render_footer(board: &Board) -> Markup {
    html! {
        footer {
            p.summary {
                (board.placed()) " items in " (board.year) ", "
                (board.scanned) " scanned"
            }
            @if !board.warnings.is_empty() {
                details.warnings open {
                    summary { (board.warnings.len()) " warnings" }
                    ul {
                        @for warning in &board.warnings {
                            li { (warning) }
                        }
                    }
                }
            }
        }
    }
}

fn month_name(month: u32) -> &'static str {
    u8::try_from(month)
        .ok()
        .and_then(|m| Month::try_from(m).ok())
        .map(|m| m.name())
        .unwrap_or("?")
}

fn css_token(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect()
}

const CSS: &str = r#"
* { box-sizing: border-box; }
body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif; margin: 0; background: #f4f4f1; color: #222; }
header { display: flex; align-items: center; gap: 24px; padding: 12px 20px; background: #263238; color: #fff; }
header h1 { margin: 0; font-size: 20px; }
header a { color: #b2dfdb; margin-right: 12px; text-decoration: none; }
form.add-item { margin-left: auto; display: flex; gap: 6px; }
.board { display: grid; grid-template-columns: repeat(12, minmax(260px, 1fr)); gap: 10px; padding: 12px; overflow-x: auto; }
.month { background: #fff; border-radius: 6px; padding: 8px; }
.month h2 { font-size: 15px; margin: 0 0 8px; display: flex; justify-content: space-between; }
.month .count { color: #888; font-weight: normal; }
.weeks { display: grid; grid-template-columns: repeat(4, 1fr); gap: 6px; }
.week { min-height: 120px; background: #fafafa; border-radius: 4px; padding: 4px; }
.week h3 { font-size: 11px; color: #777; margin: 0 0 4px; text-align: center; }
.card { background: #fffde7; border-left: 3px solid #fbc02d; border-radius: 3px; padding: 4px; margin-bottom: 4px; font-size: 12px; }
.card.status-new { border-left-color: #43a047; }
.card.status-done { opacity: 0.6; }
.card-title { font-weight: 600; word-break: break-word; }
.card-meta span { display: inline-block; margin-right: 4px; color: #555; }
.card-meta .program { color: #00796b; }
form.reschedule { display: flex; gap: 2px; margin-top: 4px; }
form.reschedule input[type=date] { width: 100%; font-size: 11px; }
footer { padding: 12px 20px; color: #555; font-size: 13px; }
.warnings li { color: #b71c1c; }
"#;

const JAVASCRIPT: &str = r#"
document.querySelectorAll('form[data-action]').forEach(function (form) {
  form.addEventListener('submit', function (event) {
    event.preventDefault();
    var body = new URLSearchParams(new FormData(form));
    body.set('action', form.dataset.action);
    fetch(window.location.pathname, { method: 'POST', body: body })
      .then(function (res) { return res.json(); })
      .then(function (data) {
        if (data.success) { window.location.reload(); }
        else { alert(data.error || 'Request failed'); }
      })
      .catch(function (err) { alert(err); });
  });
});
"#;
