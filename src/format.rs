// ✍️ Message formatting - MenuSnapshot → Telegram HTML

use crate::menu::{MealType, MenuSnapshot};
use chrono::NaiveDate;

/// Render the channel message, or `None` when there is nothing to show
pub fn format_message(meal: MealType, date: NaiveDate, snapshot: &MenuSnapshot) -> Option<String> {
    if !snapshot.has_content() {
        return None;
    }

    let mut out = format!(
        "<b>📅 {} do dia {}</b>\n",
        meal.label(),
        date.format("%d/%m/%Y")
    );

    for section in &snapshot.sections {
        out.push_str(&format!(
            "\n{} <b>{}</b>:\n",
            section.section.emoji(),
            section.section.label()
        ));
        for item in &section.items {
            out.push_str(&format!("    - {}\n", escape_html(item)));
        }
    }

    if let Some(lines) = &snapshot.fallback {
        out.push('\n');
        for line in lines {
            out.push_str(&format!("    - {}\n", escape_html(line)));
        }
    }

    Some(out)
}

/// Telegram's HTML mode only needs these three escaped
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu::MenuPayload;
    use crate::normalizer::{normalize, NormalizeRules};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 10, 7).unwrap()
    }

    #[test]
    fn test_format_sections() {
        let snapshot = normalize(
            &MenuPayload::Raw("Prato Principal\nBife & fritas\nSobremesa\nMaçã".into()),
            &NormalizeRules::default(),
        );

        let text = format_message(MealType::Dinner, date(), &snapshot).unwrap();

        assert!(text.starts_with("<b>📅 Jantar do dia 07/10/2024</b>\n"));
        assert!(text.contains("🍟 <b>Acompanhamento</b>:\n    - Arroz Branco\n"));
        assert!(text.contains("🍛 <b>Prato Principal</b>:\n    - Bife &amp; fritas\n"));
        assert!(text.contains("🍨 <b>Sobremesa</b>:\n    - Maçã\n"));
        assert!(text.find("Acompanhamento").unwrap() < text.find("Prato Principal").unwrap());
    }

    #[test]
    fn test_format_empty_snapshot() {
        let snapshot = normalize(&MenuPayload::Raw("   \n".into()), &NormalizeRules::default());

        assert_eq!(format_message(MealType::Lunch, date(), &snapshot), None);
    }

    #[test]
    fn test_format_fallback_lines() {
        let snapshot = normalize(&MenuPayload::Raw("Restaurante fechado".into()), &NormalizeRules::default());

        let text = format_message(MealType::Lunch, date(), &snapshot).unwrap();

        assert!(text.contains("Almoço do dia 07/10/2024"));
        assert!(text.ends_with("\n    - Restaurante fechado\n"));
    }
}
