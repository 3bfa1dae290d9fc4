/*!
 * Ethernity Utils
 *
 * Utilitários comuns usados em toda a workspace Ethernity
 */

use crate::types::Address;

/// Quantidade de caracteres mantidos em cada ponta ao abreviar um endereço
const ADDRESS_EDGE_CHARS: usize = 6;

/// Formata um endereço para exibição (`1A1zP1...DivfNa`)
pub fn format_address(address: &Address) -> String {
    let raw = address.as_str();
    if raw.is_empty() {
        return "desconhecido".to_string();
    }
    let chars: Vec<char> = raw.chars().collect();
    if chars.len() <= ADDRESS_EDGE_CHARS * 2 {
        return raw.to_string();
    }
    let head: String = chars[..ADDRESS_EDGE_CHARS].iter().collect();
    let tail: String = chars[chars.len() - ADDRESS_EDGE_CHARS..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Formata um valor com a moeda para rótulos de aresta
pub fn format_amount(amount: f64, currency: &str) -> String {
    let currency = if currency.is_empty() { "units" } else { currency };
    format!("{} {}", amount, currency)
}
