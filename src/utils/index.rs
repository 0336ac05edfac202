/// Render a raw token value with `decimals` fractional digits, without going through floats
pub fn format_token_amount(amount: u64, decimals: u8) -> String {
	if decimals == 0 {
		return amount.to_string();
	}
	let digits = amount.to_string();
	let decimals = usize::from(decimals);
	let padded = if digits.len() <= decimals {
		format!("{}{}", "0".repeat(decimals - digits.len() + 1), digits)
	} else {
		digits
	};
	let (whole, fraction) = padded.split_at(padded.len() - decimals);
	format!("{}.{}", whole, fraction)
}
