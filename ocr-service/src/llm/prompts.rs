//! Prompt templates for the two extraction calls.

use crate::fields::{NormalizedField, describe_fields};

/// Prompt asking a text model to pull `fields` out of OCR output.
pub fn text_extraction(ocr_text: &str, fields: &[NormalizedField]) -> String {
    format!(
        "You are a document data extraction assistant. Extract the requested fields from the following OCR text.

## Requested Fields:
{fields}

## OCR Text:
{ocr_text}

## Instructions:
1. Extract the exact values for each field from the text
2. Return the results as a JSON object with the field keys
3. If a field cannot be found, set its value to null
4. Respect the type specified for each field (convert numbers to integers/floats as needed)
5. Clean up any OCR artifacts or noise in the extracted values

Return ONLY a valid JSON object with the field keys and their extracted values.",
        fields = describe_fields(fields),
    )
}

/// Prompt asking a vision model to transcribe an image and extract `fields` in one pass.
pub fn vision_extraction(fields: &[NormalizedField]) -> String {
    format!(
        "You are an OCR and document data extraction assistant. Analyze this image and:

1. First, extract ALL visible text from the image (this will be the raw_text)
2. Then, extract the specific fields requested below

## Requested Fields:
{fields}

## Instructions:
- Return a JSON object with two keys: \"raw_text\" and \"fields\"
- \"raw_text\" should contain all text visible in the image, preserving the general reading order
- \"fields\" should contain the extracted values for each requested field key
- If a field cannot be found, set its value to null
- Respect the type specified for each field (convert numbers to integers/floats as needed)
- Clean up any noise or artifacts in the extracted values

Return ONLY a valid JSON object.",
        fields = describe_fields(fields),
    )
}
