//! Document-type-conditioned extraction prompts and the description parser.

use crate::store::DocType;
use serde_json::Value;

pub(crate) const DESCRIPTION_PROMPT: &str = "\
Provide a detailed description of what this document is about. Focus on the key \
information, purpose, and context. Be specific and informative.

Respond with JSON only in this format:
{
  \"description\": \"<detailed description of the document>\"
}

Return JSON only.";

const JSON_ONLY_PREAMBLE: &str = "and return it as valid JSON only. Do not include any \
explanation or markdown formatting, just the JSON object.";

/// Select the structured-extraction prompt for a classified document.
pub(crate) fn extraction_prompt(doc_type: DocType) -> String {
    match doc_type {
        DocType::Invoice => format!(
            "Extract structured information from this invoice image {JSON_ONLY_PREAMBLE}

Extract the following fields:
- invoiceNumber (string)
- invoiceDate (string, ISO 8601 format)
- dueDate (string, ISO 8601 format, if available)
- vendorName (string)
- customerName (string, if available)
- currency (string, ISO 4217 currency code; best guess from context if not stated)
- lineItems (array of objects with: description, quantity (number, if available), \
unitPrice (number), total (number))
- subtotal (number)
- tax (number, if available)
- total (number)

Return JSON only."
        ),
        DocType::FlightTicket => format!(
            "Extract structured information from this flight ticket image {JSON_ONLY_PREAMBLE}

Extract the following fields:
- travelingFrom (string, departure city/airport)
- travelingTo (string, destination city/airport)
- departureDate (string, ISO 8601 format)
- departureTime (string, time format)
- arrivalDate (string, ISO 8601 format, if available)
- arrivalTime (string, time format, if available)
- flightNumber (string, if available)
- passengerName (string, if available)
- bookingReference (string, if available)

Return JSON only."
        ),
        DocType::Receipt => format!(
            "Extract structured information from this receipt image {JSON_ONLY_PREAMBLE}

Extract the following fields:
- storeName (string)
- transactionDate (string, ISO 8601 format)
- transactionTime (string, time format, if available)
- currency (string, ISO 4217 currency code; best guess from context if not stated)
- items (array of objects with: name, price (number), quantity (number, if available))
- subtotal (number, if available)
- tax (number, if available)
- total (number)
- paymentMethod (string, if available)

Return JSON only."
        ),
        DocType::OrderConfirmation => format!(
            "Extract structured information from this order confirmation image {JSON_ONLY_PREAMBLE}

Extract the following fields:
- orderNumber (string)
- orderDate (string, ISO 8601 format)
- currency (string, ISO 4217 currency code; best guess from context if not stated)
- items (array of objects with: name, quantity (number), price (number))
- subtotal (number)
- tax (number, if available)
- shipping (number, if available)
- total (number)

Return JSON only."
        ),
        DocType::Other => format!(
            "Provide a detailed description of this image {JSON_ONLY_PREAMBLE}

Extract the following fields:
- description (string, detailed description of the image content)

Return JSON only."
        ),
    }
}

/// Pull the description string out of the oracle response.
///
/// Parse failures degrade to an empty string rather than failing the stage.
pub(crate) fn parse_description(raw: &str) -> String {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|value| {
            value
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_default()
}
