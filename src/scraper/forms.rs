//! 드롭다운 폼 처리
//!
//! `<select>` 요소를 정적으로 파싱해 조합을 만들고, 폼을 GET으로 제출했을 때
//! 최종 URL에 나타나는 쿼리 파라미터로 드롭다운 → 파라미터 이름 매핑을 학습합니다.

use std::collections::{BTreeMap, HashMap};

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

use super::resolve_url;

/// 드롭다운 조합 (드롭다운 이름 → 선택 값)
pub type Combo = BTreeMap<String, String>;

/// 드롭다운 옵션
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropdownOption {
    pub value: String,
    pub text: String,
}

/// `<select>` 요소
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dropdown {
    /// name 속성 (없으면 id, 그것도 없으면 `select_<순번>`)
    pub name: String,
    pub options: Vec<DropdownOption>,
}

/// 페이지의 드롭다운 추출
///
/// 값이 비어 있거나 `"0"`인 옵션("선택하세요" 류)은 제외하고,
/// 남은 옵션이 없는 드롭다운은 버립니다.
pub fn extract_dropdowns(html: &str) -> Vec<Dropdown> {
    let document = Html::parse_document(html);
    let (Ok(select_sel), Ok(option_sel)) = (Selector::parse("select"), Selector::parse("option")) else {
        return vec![];
    };

    document
        .select(&select_sel)
        .enumerate()
        .filter_map(|(i, select)| {
            let attrs = select.value();
            let name = attrs
                .attr("name")
                .or_else(|| attrs.attr("id"))
                .map(str::to_string)
                .unwrap_or_else(|| format!("select_{}", i));

            let options: Vec<DropdownOption> = select
                .select(&option_sel)
                .filter_map(|option| {
                    let text = option.text().collect::<String>().trim().to_string();
                    let value = option
                        .value()
                        .attr("value")
                        .map(|v| v.trim().to_string())
                        .unwrap_or_else(|| text.clone());
                    (!value.is_empty() && value != "0").then_some(DropdownOption { value, text })
                })
                .collect();

            (!options.is_empty()).then_some(Dropdown { name, options })
        })
        .collect()
}

/// 계단식 조합 생성
///
/// 첫 번째 드롭다운의 각 옵션을 나머지 모든 드롭다운의 각 옵션과 짝짓습니다.
/// 드롭다운이 하나면 옵션 하나짜리 조합만 만듭니다.
pub fn cascading_combinations(dropdowns: &[Dropdown]) -> Vec<Combo> {
    let Some((primary, others)) = dropdowns.split_first() else {
        return vec![];
    };

    let mut combos = Vec::new();
    for option in &primary.options {
        if others.is_empty() {
            combos.push(Combo::from([(primary.name.clone(), option.value.clone())]));
            continue;
        }
        for other in others {
            for other_option in &other.options {
                combos.push(Combo::from([
                    (primary.name.clone(), option.value.clone()),
                    (other.name.clone(), other_option.value.clone()),
                ]));
            }
        }
    }

    combos
}

/// 파라미터 학습용 표본 (5개 초과 시 0, n/4, n/2, 3n/4, n-1 위치)
pub fn sample_combinations(combos: &[Combo]) -> Vec<Combo> {
    let n = combos.len();
    if n <= 5 {
        return combos.to_vec();
    }

    let mut indices = vec![0, n / 4, n / 2, 3 * n / 4, n - 1];
    indices.dedup();
    indices.into_iter().map(|i| combos[i].clone()).collect()
}

/// 조합으로 페이지 URL 생성
///
/// 학습된 매핑이 있으면 파라미터 이름을 바꾸고, 없으면 드롭다운 이름을 그대로 씁니다.
pub fn construct_url_from_combo(base_url: &str, combo: &Combo, mapping: &HashMap<String, String>) -> String {
    if combo.is_empty() {
        return base_url.to_string();
    }

    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (name, value) in combo {
        let param = mapping.get(name).map(String::as_str).unwrap_or(name);
        serializer.append_pair(param, value);
    }
    let query = serializer.finish();

    let separator = if base_url.contains('?') { '&' } else { '?' };
    format!("{}{}{}", base_url, separator, query)
}

/// 드롭다운을 담은 첫 번째 폼의 제출 URL (action이 없으면 페이지 URL)
pub fn form_action(html: &str, page_url: &str) -> String {
    let document = Html::parse_document(html);
    let (Ok(form_sel), Ok(select_sel)) = (Selector::parse("form"), Selector::parse("select")) else {
        return page_url.to_string();
    };

    document
        .select(&form_sel)
        .find(|form| form.select(&select_sel).next().is_some())
        .and_then(|form| form.value().attr("action"))
        .and_then(|action| resolve_url(page_url, action))
        .unwrap_or_else(|| page_url.to_string())
}

/// 최종 URL의 쿼리 값과 제출한 값을 맞춰 드롭다운 → 파라미터 매핑 추출
pub fn mapping_from_final_url(final_url: &str, combo: &Combo) -> HashMap<String, String> {
    let mut mapping = HashMap::new();
    let Ok(parsed) = url::Url::parse(final_url) else {
        return mapping;
    };

    let pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    for (dropdown, value) in combo {
        if let Some((param, _)) = pairs
            .iter()
            .find(|(param, v)| v == value && !mapping.values().any(|p| p == param))
        {
            mapping.insert(dropdown.clone(), param.clone());
        }
    }

    mapping
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORM_PAGE: &str = r#"
        <form action="/ViewRss.aspx" method="post">
          <select name="ctl00$ddlMinistry">
            <option value="0">-- Select --</option>
            <option value="6">Education</option>
            <option value="9">Health</option>
          </select>
          <select id="ddlLang">
            <option value="">Choose</option>
            <option value="1">English</option>
            <option value="2">Hindi</option>
          </select>
          <select name="empty"><option value="0">None</option></select>
        </form>
    "#;

    #[test]
    fn test_extract_dropdowns() {
        let dropdowns = extract_dropdowns(FORM_PAGE);
        assert_eq!(dropdowns.len(), 2);
        assert_eq!(dropdowns[0].name, "ctl00$ddlMinistry");
        assert_eq!(dropdowns[0].options.len(), 2);
        assert_eq!(dropdowns[0].options[0].text, "Education");
        assert_eq!(dropdowns[1].name, "ddlLang");
    }

    #[test]
    fn test_cascading_combinations() {
        let dropdowns = extract_dropdowns(FORM_PAGE);
        let combos = cascading_combinations(&dropdowns);
        assert_eq!(combos.len(), 4);
        assert_eq!(combos[0]["ctl00$ddlMinistry"], "6");
        assert_eq!(combos[0]["ddlLang"], "1");
        assert_eq!(combos[3]["ctl00$ddlMinistry"], "9");
        assert_eq!(combos[3]["ddlLang"], "2");
    }

    #[test]
    fn test_single_dropdown_combinations() {
        let dropdowns = vec![Dropdown {
            name: "reg".to_string(),
            options: vec![
                DropdownOption { value: "1".into(), text: "A".into() },
                DropdownOption { value: "2".into(), text: "B".into() },
            ],
        }];
        let combos = cascading_combinations(&dropdowns);
        assert_eq!(combos.len(), 2);
        assert_eq!(combos[1].len(), 1);
        assert!(cascading_combinations(&[]).is_empty());
    }

    #[test]
    fn test_sample_combinations() {
        let combos: Vec<Combo> = (0..9)
            .map(|i| Combo::from([("k".to_string(), i.to_string())]))
            .collect();
        let sample = sample_combinations(&combos);
        let values: Vec<&str> = sample.iter().map(|c| c["k"].as_str()).collect();
        assert_eq!(values, vec!["0", "2", "4", "6", "8"]);

        assert_eq!(sample_combinations(&combos[..3]).len(), 3);
    }

    #[test]
    fn test_construct_url_from_combo() {
        let combo = Combo::from([
            ("ddlLang".to_string(), "1".to_string()),
            ("ctl00$ddlMinistry".to_string(), "6".to_string()),
        ]);
        let mapping = HashMap::from([("ctl00$ddlMinistry".to_string(), "ModId".to_string())]);

        assert_eq!(
            construct_url_from_combo("https://pib.gov.in/RssMain.aspx", &combo, &mapping),
            "https://pib.gov.in/RssMain.aspx?ModId=6&ddlLang=1"
        );
        assert_eq!(
            construct_url_from_combo("https://x/a?z=1", &combo, &HashMap::new()),
            "https://x/a?z=1&ctl00%24ddlMinistry=6&ddlLang=1"
        );
        assert_eq!(
            construct_url_from_combo("https://x/a", &Combo::new(), &mapping),
            "https://x/a"
        );
    }

    #[test]
    fn test_form_action() {
        assert_eq!(
            form_action(FORM_PAGE, "https://pib.gov.in/index.aspx"),
            "https://pib.gov.in/ViewRss.aspx"
        );
        assert_eq!(
            form_action("<select></select>", "https://pib.gov.in/index.aspx"),
            "https://pib.gov.in/index.aspx"
        );
    }

    #[test]
    fn test_mapping_from_final_url() {
        let combo = Combo::from([
            ("ddlMinistry".to_string(), "6".to_string()),
            ("ddlLang".to_string(), "1".to_string()),
        ]);
        let mapping = mapping_from_final_url("https://pib.gov.in/RssMain.aspx?ModId=6&Lang=1", &combo);
        assert_eq!(mapping.get("ddlMinistry").map(String::as_str), Some("ModId"));
        assert_eq!(mapping.get("ddlLang").map(String::as_str), Some("Lang"));

        assert!(mapping_from_final_url("https://pib.gov.in/x", &combo).is_empty());
    }
}
